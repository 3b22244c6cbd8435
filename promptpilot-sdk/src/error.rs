use thiserror::Error;

/// Error types for the prompt pipeline
#[derive(Error, Debug)]
pub enum PilotError {
    /// Authentication failed (HTTP 401/403, or no token available)
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// Invalid request parameters (HTTP 400, or rejected locally)
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// API error with status code (HTTP 4xx/5xx except above)
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Network or connection error
    #[error("Network error: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    /// JSON parsing or serialization error
    #[error("Parse error: {source}")]
    Parse {
        #[from]
        source: serde_json::Error,
    },

    /// An operation ran past its deadline and was abandoned
    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    /// The caller cancelled the operation
    #[error("Request aborted")]
    Aborted,

    /// A single WebSocket connection attempt failed
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// Every connection attempt failed
    #[error("Could not connect to the generation stream after {attempts} attempts")]
    ConnectionFailed { attempts: u32 },

    /// The server reported an error inside the stream
    #[error("Stream error: {message}")]
    Stream { message: String },

    /// The session was asked to move to a state it cannot reach
    #[error("Invalid session transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Generic error for unexpected cases
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl PilotError {
    /// Create an authentication error
    pub fn authentication<S: Into<String>>(message: S) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Create an invalid request error
    pub fn invalid_request<S: Into<String>>(message: S) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Create an API error
    pub fn api_error(status: u16, message: String) -> Self {
        Self::Api { status, message }
    }

    pub fn timeout<S: Into<String>>(operation: S, seconds: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            seconds,
        }
    }

    pub fn connection<S: Into<String>>(message: S) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn stream<S: Into<String>>(message: S) -> Self {
        Self::Stream {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether trying again later could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. }
            | Self::Timeout { .. }
            | Self::Connection { .. }
            | Self::ConnectionFailed { .. } => true,
            Self::Api { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}
