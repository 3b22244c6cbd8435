use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use shared_types::{
    ErrorResponse, OptimizePromptRequest, OptimizePromptResponse, ReasoningAgentRequest,
    ReasoningAgentResponse, RoutePromptRequest, RoutePromptResponse,
};

use crate::{auth::TokenProvider, client::PromptService, config::ClientConfig, error::PilotError};

/// Authenticated JSON client for the backend REST API
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    http_client: reqwest::Client,
    tokens: Arc<dyn TokenProvider>,
}

impl ApiClient {
    pub fn new(config: &ClientConfig, tokens: Arc<dyn TokenProvider>) -> Result<Self, PilotError> {
        if config.base_url.trim().is_empty() {
            return Err(PilotError::invalid_request("Base URL cannot be empty"));
        }

        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300)) // hard cap, callers use shorter deadlines
            .build()
            .map_err(|e| PilotError::Network { source: e })?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http_client,
            tokens,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Build a request carrying a freshly fetched bearer token
    pub(crate) async fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, PilotError> {
        let token = self.tokens.access_token().await?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| PilotError::authentication("Invalid token format"))?;

        Ok(self
            .http_client
            .request(method, self.url(path))
            .header(AUTHORIZATION, bearer)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json")))
    }

    /// POST a JSON body and return the raw response once the status is OK
    pub(crate) async fn post_raw<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Response, PilotError> {
        let response = self
            .request(Method::POST, path)
            .await?
            .json(body)
            .send()
            .await
            .map_err(|e| PilotError::Network { source: e })?;

        check_status(response).await
    }

    pub async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, PilotError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self.post_raw(path, body).await?;
        parse_json(response).await
    }

    pub async fn get_json<R: DeserializeOwned>(&self, path: &str) -> Result<R, PilotError> {
        let response = self
            .request(Method::GET, path)
            .await?
            .send()
            .await
            .map_err(|e| PilotError::Network { source: e })?;

        parse_json(check_status(response).await?).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), PilotError> {
        let response = self
            .request(Method::DELETE, path)
            .await?
            .send()
            .await
            .map_err(|e| PilotError::Network { source: e })?;

        check_status(response).await?;
        Ok(())
    }
}

async fn parse_json<R: DeserializeOwned>(response: Response) -> Result<R, PilotError> {
    let text = response
        .text()
        .await
        .map_err(|e| PilotError::Network { source: e })?;
    serde_json::from_str(&text).map_err(|e| PilotError::Parse { source: e })
}

/// Map non-2xx responses onto [`PilotError`]
pub(crate) async fn check_status(response: Response) -> Result<Response, PilotError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());

    // The backend wraps failures as {"detail": ...}
    let message = serde_json::from_str::<ErrorResponse>(&error_text)
        .map(|body| body.message())
        .unwrap_or(error_text);

    Err(match status {
        StatusCode::BAD_REQUEST => PilotError::invalid_request(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PilotError::authentication(message),
        StatusCode::PAYLOAD_TOO_LARGE => PilotError::invalid_request("Request too large"),
        _ => PilotError::api_error(status.as_u16(), message),
    })
}

#[async_trait]
impl PromptService for ApiClient {
    async fn route_prompt(&self, prompt: &str) -> Result<bool, PilotError> {
        let response: RoutePromptResponse = self
            .post_json(
                "/prompt/route-prompt",
                &RoutePromptRequest {
                    prompt: prompt.to_string(),
                },
            )
            .await?;
        Ok(response.needs_reasoning)
    }

    async fn optimize_prompt(&self, prompt: &str) -> Result<String, PilotError> {
        let response: OptimizePromptResponse = self
            .post_json(
                "/prompt/optimize-prompt",
                &OptimizePromptRequest {
                    prompt: prompt.to_string(),
                },
            )
            .await?;
        Ok(response.optimized_prompt)
    }

    async fn reasoning_turn(&self, transcript: &str) -> Result<String, PilotError> {
        let response: ReasoningAgentResponse = self
            .post_json(
                "/agents/reasoning-agent",
                &ReasoningAgentRequest {
                    prompt: transcript.to_string(),
                },
            )
            .await?;
        Ok(response.reasoned_prompt)
    }
}
