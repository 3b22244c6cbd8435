use serde::{Deserialize, Serialize};
use ts_rs::TS;

pub mod agent;
pub mod chat;
pub mod parameters;
pub mod prompt;
pub mod stream;

pub use agent::{ActionCompletion, ActionRequest, Agent, ExecutePromptRequest, SaveAgentRequest};
pub use chat::{ChatMessage, ChatRole};
pub use parameters::{MissingParameter, ParameterAnswer, ParameterForm};
pub use prompt::{
    OptimizePromptRequest, OptimizePromptResponse, ReasoningAgentRequest,
    ReasoningAgentResponse, RoutePromptRequest, RoutePromptResponse,
};
pub use stream::{StreamKind, StreamMessage, StreamPhase, StreamRequest};

/// Error body returned by the backend for non-2xx responses.
///
/// The backend wraps every failure as `{"detail": ...}`; `detail` is usually a
/// string but validation failures carry a list of objects.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ErrorResponse {
    pub detail: serde_json::Value,
}

impl ErrorResponse {
    /// Flatten `detail` into a single human readable line
    pub fn message(&self) -> String {
        match &self.detail {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_string_detail() {
        let body: ErrorResponse = serde_json::from_str(r#"{"detail":"Prompt cannot be empty."}"#).unwrap();
        assert_eq!(body.message(), "Prompt cannot be empty.");
    }

    #[test]
    fn test_error_response_structured_detail() {
        let body: ErrorResponse =
            serde_json::from_str(r#"{"detail":[{"loc":["body","prompt"],"msg":"field required"}]}"#)
                .unwrap();
        assert!(body.message().contains("field required"));
    }
}
