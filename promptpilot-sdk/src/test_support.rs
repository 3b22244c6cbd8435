//! In-memory stand-ins for the network seams, shared by unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use shared_types::StreamMessage;
use tokio::sync::mpsc;
use url::Url;

use crate::auth::TokenProvider;
use crate::client::PromptService;
use crate::error::PilotError;
use crate::stream::{StreamConnector, StreamTransport};

pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Server side of an in-memory connection
pub struct FakeServer {
    pub frames: mpsc::UnboundedSender<String>,
    pub received: Arc<Mutex<Vec<String>>>,
}

impl FakeServer {
    pub fn push(&self, message: &StreamMessage) {
        self.frames
            .send(serde_json::to_string(message).unwrap())
            .unwrap();
    }

    pub fn push_raw(&self, raw: &str) {
        self.frames.send(raw.to_string()).unwrap();
    }

    /// First frame sent by the client, parsed
    pub fn first_frame(&self) -> serde_json::Value {
        let received = self.received.lock().unwrap();
        serde_json::from_str(&received[0]).unwrap()
    }
}

pub struct FakeTransport {
    id: usize,
    frames: mpsc::UnboundedReceiver<String>,
    received: Arc<Mutex<Vec<String>>>,
    log: EventLog,
}

#[async_trait]
impl StreamTransport for FakeTransport {
    async fn send_text(&mut self, text: String) -> Result<(), PilotError> {
        self.received.lock().unwrap().push(text);
        Ok(())
    }

    async fn next_text(&mut self) -> Option<Result<String, PilotError>> {
        self.frames.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), PilotError> {
        self.log.lock().unwrap().push(format!("close:{}", self.id));
        Ok(())
    }
}

pub enum Attempt {
    Fail,
    Hang,
    Open(FakeTransport),
}

/// Connection `id` whose lifecycle is recorded in `log`
pub fn connection(id: usize, log: &EventLog) -> (Attempt, FakeServer) {
    let (tx, rx) = mpsc::unbounded_channel();
    let received = Arc::new(Mutex::new(Vec::new()));
    let transport = FakeTransport {
        id,
        frames: rx,
        received: received.clone(),
        log: log.clone(),
    };
    (
        Attempt::Open(transport),
        FakeServer {
            frames: tx,
            received,
        },
    )
}

/// Plays back connection attempts in order; refuses once they run out
pub struct FakeConnector {
    attempts: Mutex<VecDeque<Attempt>>,
    pub urls: Mutex<Vec<Url>>,
    log: EventLog,
}

impl FakeConnector {
    pub fn new(attempts: Vec<Attempt>, log: &EventLog) -> Arc<Self> {
        Arc::new(Self {
            attempts: Mutex::new(attempts.into()),
            urls: Mutex::new(Vec::new()),
            log: log.clone(),
        })
    }
}

#[async_trait]
impl StreamConnector for FakeConnector {
    async fn connect(&self, url: &Url) -> Result<Box<dyn StreamTransport>, PilotError> {
        self.urls.lock().unwrap().push(url.clone());
        let attempt = self.attempts.lock().unwrap().pop_front();
        match attempt {
            Some(Attempt::Open(transport)) => {
                self.log.lock().unwrap().push(format!("open:{}", transport.id));
                Ok(Box::new(transport))
            }
            Some(Attempt::Hang) => std::future::pending().await,
            Some(Attempt::Fail) | None => Err(PilotError::connection("refused")),
        }
    }
}

/// Hands out a new token on every call: tok1, tok2, ...
#[derive(Default)]
pub struct CountingTokens {
    pub calls: AtomicUsize,
}

#[async_trait]
impl TokenProvider for CountingTokens {
    async fn access_token(&self) -> Result<String, PilotError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("tok{}", n))
    }
}

/// Prompt service with fixed answers
pub struct FixedService {
    pub needs_reasoning: bool,
    pub chat_reply: String,
}

#[async_trait]
impl PromptService for FixedService {
    async fn route_prompt(&self, _prompt: &str) -> Result<bool, PilotError> {
        Ok(self.needs_reasoning)
    }

    async fn optimize_prompt(&self, prompt: &str) -> Result<String, PilotError> {
        Ok(format!("Optimized: {}", prompt))
    }

    async fn reasoning_turn(&self, _transcript: &str) -> Result<String, PilotError> {
        Ok(self.chat_reply.clone())
    }
}

/// Let spawned tasks run until they block
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}
