// Frames exchanged over the /execute-agent WebSocket

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

/// First frame sent by the client once the socket is open
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct StreamRequest {
    pub prompt: String,
    pub needs_reasoning: bool,
    /// Ask the server for a parameter list instead of code
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub identify_parameters: bool,
}

impl StreamRequest {
    pub fn new(prompt: impl Into<String>, needs_reasoning: bool) -> Self {
        Self {
            prompt: prompt.into(),
            needs_reasoning,
            identify_parameters: false,
        }
    }

    pub fn identify_parameters(mut self) -> Self {
        self.identify_parameters = true;
        self
    }
}

/// Pipeline stage that produced a frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum StreamPhase {
    Reasoning,
    Claude,
    Optimize,
    Done,
    Error,
    Auth,
    Input,
    #[default]
    #[serde(other)]
    Other,
}

/// Kind of payload carried by a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Start,
    Text,
    ToolUse,
    ToolResult,
    Code,
    Plan,
    Tools,
    Reflection,
    Formatted,
    ParametersStart,
    Parameters,
    ParametersError,
    ParametersDone,
    Done,
    Error,
    #[serde(other)]
    Other,
}

/// A server frame. Only `type` is guaranteed; everything else depends on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StreamMessage {
    #[serde(default)]
    pub phase: StreamPhase,
    #[serde(rename = "type")]
    pub kind: StreamKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl StreamMessage {
    pub fn new(phase: StreamPhase, kind: StreamKind) -> Self {
        Self {
            phase,
            kind,
            content: None,
            tool: None,
            input: None,
            result: None,
        }
    }

    pub fn text(phase: StreamPhase, text: impl Into<String>) -> Self {
        Self {
            content: Some(Value::String(text.into())),
            ..Self::new(phase, StreamKind::Text)
        }
    }

    pub fn done() -> Self {
        Self::new(StreamPhase::Done, StreamKind::Done)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: Some(Value::String(message.into())),
            ..Self::new(StreamPhase::Error, StreamKind::Error)
        }
    }

    /// `done` and `error` frames end the stream
    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, StreamKind::Done | StreamKind::Error)
    }

    /// Content as plain text: strings verbatim, anything else as compact JSON
    pub fn content_text(&self) -> Option<String> {
        match &self.content {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        }
    }
}
