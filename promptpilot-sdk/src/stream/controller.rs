use std::sync::Arc;
use std::time::Duration;

use shared_types::{StreamKind, StreamMessage, StreamRequest};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use url::Url;
use uuid::Uuid;

use super::gate::{Admission, PauseGate};
use super::transport::{StreamConnector, StreamTransport};
use crate::{
    auth::TokenProvider,
    config::{ClientConfig, RetryPolicy},
    error::PilotError,
    notify::{Notice, Notifier},
};

/// What the handler wants after seeing a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Hold back every later frame until [`StreamHandle::resume`]
    Pause,
}

/// Consumer of stream frames.
///
/// Runs on the stream task, one frame at a time and in arrival order. Returning
/// [`Flow::Pause`] takes effect before the next frame is looked at.
pub trait StreamHandler: Send + 'static {
    fn on_message(&mut self, message: StreamMessage) -> Flow;

    fn on_end(&mut self, _outcome: &StreamOutcome) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// A `done` frame arrived
    Completed,
    /// An `error` frame arrived, or the socket failed
    Failed(String),
    /// The server closed without sending `done`
    Disconnected,
    /// Closed from this side
    Closed,
}

#[derive(Debug)]
enum Command {
    Pause,
    Resume,
    Close,
}

/// Control surface for one live stream
#[derive(Debug)]
pub struct StreamHandle {
    id: Uuid,
    commands: mpsc::UnboundedSender<Command>,
    task: Option<JoinHandle<StreamOutcome>>,
    outcome: Option<StreamOutcome>,
}

impl StreamHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns false when the stream already ended
    pub fn pause(&self) -> bool {
        self.commands.send(Command::Pause).is_ok()
    }

    pub fn resume(&self) -> bool {
        self.commands.send(Command::Resume).is_ok()
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }

    /// Close the connection and wait for the stream task. Safe to call repeatedly.
    pub async fn close(&mut self) -> StreamOutcome {
        let _ = self.commands.send(Command::Close);
        self.wait().await
    }

    /// Wait for the stream to end on its own
    pub async fn wait(&mut self) -> StreamOutcome {
        if let Some(task) = self.task.take() {
            let outcome = task.await.unwrap_or_else(|e| {
                tracing::error!(stream_id = %self.id, "Stream task failed: {}", e);
                StreamOutcome::Failed("stream task stopped unexpectedly".to_string())
            });
            self.outcome = Some(outcome);
        }
        self.outcome.clone().unwrap_or(StreamOutcome::Closed)
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            let _ = self.commands.send(Command::Close);
        }
    }
}

/// Opens generation streams, at most one at a time
pub struct StreamController {
    connector: Arc<dyn StreamConnector>,
    tokens: Arc<dyn TokenProvider>,
    notifier: Arc<dyn Notifier>,
    ws_url: String,
    connect_timeout: Duration,
    policy: RetryPolicy,
    queue_capacity: usize,
    active: Option<StreamHandle>,
}

impl StreamController {
    pub fn new(
        connector: Arc<dyn StreamConnector>,
        tokens: Arc<dyn TokenProvider>,
        notifier: Arc<dyn Notifier>,
        config: &ClientConfig,
    ) -> Self {
        Self {
            connector,
            tokens,
            notifier,
            ws_url: config.ws_url.clone(),
            connect_timeout: config.connect_timeout,
            policy: config.connect_policy(),
            queue_capacity: config.queue_capacity,
            active: None,
        }
    }

    pub fn active(&self) -> Option<&StreamHandle> {
        self.active.as_ref()
    }

    pub fn active_mut(&mut self) -> Option<&mut StreamHandle> {
        self.active.as_mut()
    }

    /// Start a new stream for `request`.
    ///
    /// Any previous stream is fully torn down before the new connection is
    /// opened. The request is sent as the first frame; every later frame goes
    /// to `handler`.
    pub async fn submit(
        &mut self,
        request: StreamRequest,
        handler: Box<dyn StreamHandler>,
    ) -> Result<&mut StreamHandle, PilotError> {
        if request.prompt.trim().is_empty() {
            return Err(PilotError::invalid_request("Prompt cannot be empty."));
        }

        if let Some(outcome) = self.teardown().await {
            tracing::debug!(?outcome, "Previous stream closed before new submission");
        }

        let mut transport = self.connect_with_retry().await?;

        let first_frame = serde_json::to_string(&request)?;
        if let Err(e) = transport.send_text(first_frame).await {
            let _ = transport.close().await;
            self.notifier
                .notify(Notice::error(format!("Could not send the prompt: {}", e)));
            return Err(e);
        }

        let id = Uuid::new_v4();
        let (commands, command_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_stream(
            id,
            transport,
            handler,
            command_rx,
            self.notifier.clone(),
            self.queue_capacity,
        ));

        tracing::info!(stream_id = %id, needs_reasoning = request.needs_reasoning, "Stream started");
        Ok(self.active.insert(StreamHandle {
            id,
            commands,
            task: Some(task),
            outcome: None,
        }))
    }

    /// Close the active stream, if any, and wait until it is gone
    pub async fn teardown(&mut self) -> Option<StreamOutcome> {
        let mut handle = self.active.take()?;
        Some(handle.close().await)
    }

    async fn connect_with_retry(&self) -> Result<Box<dyn StreamTransport>, PilotError> {
        let attempts = self.policy.max_attempts;

        for attempt in 1..=attempts {
            // Fresh token per attempt; expiry during backoff is expected
            let token = self.tokens.access_token().await?;
            let url = stream_url(&self.ws_url, &token)?;

            match tokio::time::timeout(self.connect_timeout, self.connector.connect(&url)).await {
                Ok(Ok(transport)) => return Ok(transport),
                Ok(Err(e)) => {
                    tracing::warn!(attempt, attempts, "Stream connection failed: {}", e);
                }
                Err(_) => {
                    tracing::warn!(
                        attempt,
                        attempts,
                        "Stream connection timed out after {}s",
                        self.connect_timeout.as_secs()
                    );
                }
            }

            if attempt < attempts {
                tokio::time::sleep(self.policy.delay_for(attempt)).await;
            }
        }

        self.notifier.notify(Notice::error(format!(
            "Could not connect to the code generator after {} attempts.",
            attempts
        )));
        Err(PilotError::ConnectionFailed { attempts })
    }
}

/// Stream URL with the token as the `token` query parameter
pub fn stream_url(base: &str, token: &str) -> Result<Url, PilotError> {
    let mut url = Url::parse(base)
        .map_err(|e| PilotError::invalid_request(format!("Invalid stream URL '{}': {}", base, e)))?;
    url.query_pairs_mut().append_pair("token", token);
    Ok(url)
}

async fn run_stream(
    id: Uuid,
    mut transport: Box<dyn StreamTransport>,
    mut handler: Box<dyn StreamHandler>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    notifier: Arc<dyn Notifier>,
    capacity: usize,
) -> StreamOutcome {
    let mut gate = PauseGate::new(capacity);
    let mut reading = true;
    let mut pending_end = StreamOutcome::Disconnected;

    let outcome = loop {
        if let Some(outcome) = drain(&mut gate, handler.as_mut(), notifier.as_ref()) {
            break outcome;
        }
        if !reading && gate.is_empty() {
            break pending_end.clone();
        }

        tokio::select! {
            biased;

            command = commands.recv() => match command {
                Some(Command::Pause) => gate.pause(),
                Some(Command::Resume) => gate.resume(),
                Some(Command::Close) | None => break StreamOutcome::Closed,
            },

            frame = transport.next_text(), if reading && !gate.is_full() => match frame {
                Some(Ok(text)) => match serde_json::from_str::<StreamMessage>(&text) {
                    Ok(message) => {
                        if message.is_terminal() {
                            reading = false;
                        }
                        if let Admission::Deliver(message) = gate.admit(message) {
                            if let Some(outcome) =
                                deliver(message, &mut gate, handler.as_mut(), notifier.as_ref())
                            {
                                break outcome;
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(stream_id = %id, "Skipping unparseable frame: {}", e);
                        notifier.notify(Notice::warning("Received a message that could not be read; skipping it."));
                    }
                },
                Some(Err(e)) => {
                    reading = false;
                    notifier.notify(Notice::error(format!("Connection to the code generator failed: {}", e)));
                    pending_end = StreamOutcome::Failed(e.to_string());
                }
                None => {
                    reading = false;
                    notifier.notify(Notice::warning("The code generator closed the connection before finishing."));
                }
            },
        }
    };

    if let Err(e) = transport.close().await {
        tracing::debug!(stream_id = %id, "Stream close failed: {}", e);
    }
    handler.on_end(&outcome);
    tracing::info!(stream_id = %id, ?outcome, "Stream ended");
    outcome
}

/// Deliver every queued frame the gate releases
fn drain(
    gate: &mut PauseGate<StreamMessage>,
    handler: &mut dyn StreamHandler,
    notifier: &dyn Notifier,
) -> Option<StreamOutcome> {
    while let Some(message) = gate.next_ready() {
        if let Some(outcome) = deliver(message, gate, handler, notifier) {
            return Some(outcome);
        }
    }
    None
}

fn deliver(
    message: StreamMessage,
    gate: &mut PauseGate<StreamMessage>,
    handler: &mut dyn StreamHandler,
    notifier: &dyn Notifier,
) -> Option<StreamOutcome> {
    let terminal = match message.kind {
        StreamKind::Done => Some(StreamOutcome::Completed),
        StreamKind::Error => {
            let reason = message
                .content_text()
                .unwrap_or_else(|| "unknown error".to_string());
            notifier.notify(Notice::error(format!("Code generation failed: {}", reason)));
            Some(StreamOutcome::Failed(reason))
        }
        _ => None,
    };

    let flow = handler.on_message(message);
    if terminal.is_some() {
        return terminal;
    }
    if flow == Flow::Pause {
        gate.pause();
    }
    None
}
