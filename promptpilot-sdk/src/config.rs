use std::time::Duration;

/// Exponential backoff used for chat turns and stream reconnects
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the `failed_attempt`-th failure (1-based): 1s, 2s, 4s, 5s, 5s...
    pub fn delay_for(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

/// Endpoints and limits used by every pipeline component
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// HTTP API root, e.g. `http://localhost:8000/api/v1`
    pub base_url: String,
    /// Full WebSocket URL of the generation stream
    pub ws_url: String,
    pub route_timeout: Duration,
    pub connect_timeout: Duration,
    /// Reconnects after the first failed connection attempt
    pub connect_retries: u32,
    pub action_timeout: Duration,
    /// Frames buffered while a stream is paused before reading stops
    pub queue_capacity: usize,
    pub chat_retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api/v1".to_string(),
            ws_url: "ws://localhost:8000/execute-agent".to_string(),
            route_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
            connect_retries: 3,
            action_timeout: Duration::from_secs(30),
            queue_capacity: 1024,
            chat_retry: RetryPolicy::default(),
        }
    }
}

impl ClientConfig {
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_ws_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = url.into();
        self
    }

    /// Backoff for stream reconnects: same schedule as chat turns, more attempts
    pub fn connect_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.connect_retries + 1,
            ..self.chat_retry.clone()
        }
    }
}
