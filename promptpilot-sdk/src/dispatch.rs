use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use shared_types::{ActionCompletion, ActionRequest};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    config::ClientConfig,
    error::PilotError,
    http::ApiClient,
    notify::{Notice, Notifier},
};

/// What to do with generated code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Execute,
    Test,
    Schedule,
}

impl Action {
    pub fn path(&self) -> &'static str {
        match self {
            Action::Execute => "/agents/v2/execute",
            Action::Test => "/agents/v2/test",
            Action::Schedule => "/agents/v2/schedule",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Action::Execute => "execute",
            Action::Test => "test",
            Action::Schedule => "schedule",
        };
        write!(f, "{}", name)
    }
}

/// Output of an execute call, in arrival order.
///
/// Keeps whatever arrived even when the call later fails.
#[derive(Debug, Default)]
pub struct ExecutionLog {
    text: String,
    chunks: usize,
    tap: Option<mpsc::UnboundedSender<String>>,
}

impl ExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also forward every chunk to `tap`, e.g. for live display
    pub fn with_tap(tap: mpsc::UnboundedSender<String>) -> Self {
        Self {
            tap: Some(tap),
            ..Self::default()
        }
    }

    pub fn push(&mut self, chunk: &str) {
        if chunk.is_empty() {
            return;
        }
        self.text.push_str(chunk);
        self.chunks += 1;
        let tap_closed = self
            .tap
            .as_ref()
            .is_some_and(|tap| tap.send(chunk.to_string()).is_err());
        if tap_closed {
            self.tap = None;
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Incremental UTF-8 decoding across arbitrary chunk boundaries
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    carry: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode as much as possible; an incomplete trailing sequence is kept
    /// for the next call and invalid bytes become U+FFFD.
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.carry.extend_from_slice(bytes);
        let mut out = String::new();

        loop {
            match std::str::from_utf8(&self.carry) {
                Ok(valid) => {
                    out.push_str(valid);
                    self.carry.clear();
                    break;
                }
                Err(e) => {
                    let valid_up_to = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.carry[..valid_up_to]));
                    match e.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.carry.drain(..valid_up_to + bad);
                        }
                        None => {
                            self.carry.drain(..valid_up_to);
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// Flush a truncated sequence left at end of input
    pub fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.carry).into_owned();
        self.carry.clear();
        rest
    }
}

/// Sends finished code to the execute/test/schedule endpoints
pub struct ActionDispatcher {
    api: ApiClient,
    notifier: Arc<dyn Notifier>,
    timeout: Duration,
}

impl ActionDispatcher {
    pub fn new(api: ApiClient, notifier: Arc<dyn Notifier>, config: &ClientConfig) -> Self {
        Self {
            api,
            notifier,
            timeout: config.action_timeout,
        }
    }

    /// Run the code and stream its output into `log`.
    ///
    /// The timeout covers the whole exchange, body included. Cancelling
    /// `cancel` stops local listening only; the server run is not stopped.
    pub async fn execute(
        &self,
        request: &ActionRequest,
        log: &mut ExecutionLog,
        cancel: &CancellationToken,
    ) -> Result<(), PilotError> {
        ensure_code(request)?;
        tracing::info!(code_len = request.code.len(), "Executing generated agent");

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PilotError::Aborted),
            outcome = tokio::time::timeout(self.timeout, self.stream_execution(request, log)) => {
                outcome.unwrap_or_else(|_| Err(PilotError::timeout(Action::Execute.to_string(), self.timeout.as_secs())))
            }
        };

        if let Err(e) = &result {
            self.report_failure(Action::Execute, e);
        }
        result
    }

    async fn stream_execution(&self, request: &ActionRequest, log: &mut ExecutionLog) -> Result<(), PilotError> {
        let response = self.api.post_raw(Action::Execute.path(), request).await?;

        let mut decoder = Utf8Decoder::new();
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| PilotError::Network { source: e })?;
            log.push(&decoder.decode(&chunk));
        }
        log.push(&decoder.finish());

        tracing::debug!(chunks = log.chunk_count(), "Execution output complete");
        Ok(())
    }

    pub async fn test(&self, request: &ActionRequest, cancel: &CancellationToken) -> Result<ActionCompletion, PilotError> {
        self.complete(Action::Test, request, cancel).await
    }

    pub async fn schedule(
        &self,
        request: &ActionRequest,
        cancel: &CancellationToken,
    ) -> Result<ActionCompletion, PilotError> {
        self.complete(Action::Schedule, request, cancel).await
    }

    async fn complete(
        &self,
        action: Action,
        request: &ActionRequest,
        cancel: &CancellationToken,
    ) -> Result<ActionCompletion, PilotError> {
        ensure_code(request)?;
        tracing::info!(%action, "Dispatching generated agent");

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PilotError::Aborted),
            outcome = tokio::time::timeout(self.timeout, self.api.post_json::<_, ActionCompletion>(action.path(), request)) => {
                outcome.unwrap_or_else(|_| Err(PilotError::timeout(action.to_string(), self.timeout.as_secs())))
            }
        };

        match &result {
            Ok(completion) => {
                tracing::info!(%action, status = %completion.status, "Action completed");
                self.notifier.notify(Notice::info(if completion.message.is_empty() {
                    format!("{}: {}", action, completion.status)
                } else {
                    completion.message.clone()
                }));
            }
            Err(e) => self.report_failure(action, e),
        }
        result
    }

    fn report_failure(&self, action: Action, e: &PilotError) {
        let message = match e {
            PilotError::Aborted => format!("The {} request was cancelled.", action),
            PilotError::Timeout { seconds, .. } => {
                format!("The {} request timed out after {}s. You can try again.", action, seconds)
            }
            other => format!("The {} request failed: {}", action, other),
        };
        tracing::error!(%action, "{}", message);
        self.notifier.notify(Notice::error(message));
    }
}

fn ensure_code(request: &ActionRequest) -> Result<(), PilotError> {
    if request.code.trim().is_empty() {
        return Err(PilotError::invalid_request("There is no code to send."));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticToken;
    use crate::notify::{ChannelNotifier, NoticeLevel};
    use mockito::Matcher;
    use serde_json::json;
    use std::io::Write;

    fn request() -> ActionRequest {
        ActionRequest {
            prompt: "Email me the weather".to_string(),
            optimized_prompt: "Write a script that emails the weather".to_string(),
            needs_reasoning: false,
            code: "print('sunny')".to_string(),
        }
    }

    fn dispatcher(
        url: String,
        timeout: Duration,
    ) -> (ActionDispatcher, mpsc::UnboundedReceiver<Notice>) {
        let config = ClientConfig {
            action_timeout: timeout,
            ..ClientConfig::default().with_base_url(url)
        };
        let api = ApiClient::new(&config, Arc::new(StaticToken::new("tok").unwrap())).unwrap();
        let (notifier, rx) = ChannelNotifier::new();
        (ActionDispatcher::new(api, Arc::new(notifier), &config), rx)
    }

    #[test]
    fn test_decoder_handles_split_sequences() {
        let bytes = "héllo ✓".as_bytes();
        let mut decoder = Utf8Decoder::new();
        let mut out = String::new();
        for byte in bytes {
            out.push_str(&decoder.decode(std::slice::from_ref(byte)));
        }
        out.push_str(&decoder.finish());
        assert_eq!(out, "héllo ✓");
    }

    #[test]
    fn test_decoder_replaces_invalid_bytes() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(b"a\xffb"), "a\u{FFFD}b");
        assert_eq!(decoder.decode(b"\xe2\x9c"), "");
        assert_eq!(decoder.finish(), "\u{FFFD}");
    }

    #[test]
    fn test_log_tap_receives_chunks() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut log = ExecutionLog::with_tap(tx);
        log.push("one\n");
        log.push("");
        log.push("two\n");
        assert_eq!(log.as_str(), "one\ntwo\n");
        assert_eq!(log.chunk_count(), 2);
        assert_eq!(rx.try_recv().unwrap(), "one\n");
        assert_eq!(rx.try_recv().unwrap(), "two\n");
    }

    #[tokio::test]
    async fn test_execute_streams_body_into_log() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/agents/v2/execute")
            .match_header("authorization", "Bearer tok")
            .match_body(Matcher::Json(json!({
                "prompt": "Email me the weather",
                "optimizedPrompt": "Write a script that emails the weather",
                "needsReasoning": "false",
                "code": "print('sunny')"
            })))
            .with_status(200)
            .with_header("content-type", "text/plain")
            .with_chunked_body(|w| {
                w.write_all(b"starting\n")?;
                w.write_all(&"sunny ☀\n".as_bytes()[..8])?;
                w.write_all(&"sunny ☀\n".as_bytes()[8..])?;
                w.write_all(b"done\n")
            })
            .create_async()
            .await;

        let (dispatcher, _rx) = dispatcher(server.url(), Duration::from_secs(30));
        let mut log = ExecutionLog::new();
        dispatcher
            .execute(&request(), &mut log, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(log.as_str(), "starting\nsunny ☀\ndone\n");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_execute_non_ok_is_terminal_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/agents/v2/execute")
            .with_status(500)
            .with_body(r#"{"detail":"sandbox crashed"}"#)
            .create_async()
            .await;

        let (dispatcher, mut rx) = dispatcher(server.url(), Duration::from_secs(30));
        let mut log = ExecutionLog::new();
        let err = dispatcher
            .execute(&request(), &mut log, &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            PilotError::Api { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "sandbox crashed");
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(log.is_empty());
        assert_eq!(rx.try_recv().unwrap().level, NoticeLevel::Error);
    }

    #[tokio::test]
    async fn test_execute_timeout_keeps_partial_output() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/agents/v2/execute")
            .with_status(200)
            .with_chunked_body(|w| {
                w.write_all(b"partial\n")?;
                w.flush()?;
                std::thread::sleep(std::time::Duration::from_millis(1500));
                w.write_all(b"late\n")
            })
            .create_async()
            .await;

        let (dispatcher, mut rx) = dispatcher(server.url(), Duration::from_millis(500));
        let mut log = ExecutionLog::new();
        let err = dispatcher
            .execute(&request(), &mut log, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, PilotError::Timeout { .. }));
        assert!(!log.as_str().contains("late"));
        assert!(rx.try_recv().unwrap().message.contains("timed out"));
    }

    #[tokio::test]
    async fn test_cancelled_before_send_is_aborted() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/agents/v2/execute")
            .expect(0)
            .create_async()
            .await;

        let (dispatcher, _rx) = dispatcher(server.url(), Duration::from_secs(30));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = dispatcher
            .execute(&request(), &mut ExecutionLog::new(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, PilotError::Aborted));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_schedule_returns_completion() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/agents/v2/schedule")
            .match_body(Matcher::PartialJson(json!({"needsReasoning": "false"})))
            .with_status(200)
            .with_body(r#"{"status":"scheduled","message":"Runs daily","schedule_id":"s-1"}"#)
            .create_async()
            .await;

        let (dispatcher, mut rx) = dispatcher(server.url(), Duration::from_secs(30));
        let completion = dispatcher
            .schedule(&request(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(completion.status, "scheduled");
        assert_eq!(completion.schedule_id.as_deref(), Some("s-1"));
        assert_eq!(rx.try_recv().unwrap().message, "Runs daily");
    }

    #[tokio::test]
    async fn test_test_action_auth_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/agents/v2/test")
            .with_status(401)
            .with_body(r#"{"detail":"Token expired"}"#)
            .create_async()
            .await;

        let (dispatcher, _rx) = dispatcher(server.url(), Duration::from_secs(30));
        let err = dispatcher
            .test(&request(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PilotError::Authentication { .. }));
    }

    #[tokio::test]
    async fn test_empty_code_rejected_locally() {
        let (dispatcher, _rx) = dispatcher("http://127.0.0.1:9".to_string(), Duration::from_secs(30));
        let mut req = request();
        req.code = "  ".to_string();
        assert!(matches!(
            dispatcher.test(&req, &CancellationToken::new()).await,
            Err(PilotError::InvalidRequest { .. })
        ));
    }
}
