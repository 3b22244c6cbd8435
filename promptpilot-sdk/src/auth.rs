use async_trait::async_trait;

use crate::error::PilotError;

/// Source of bearer tokens.
///
/// Called right before every request and every connection attempt; callers
/// never cache the result, so implementations own any refresh logic.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String, PilotError>;
}

/// A fixed token, e.g. pasted into the config file
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Result<Self, PilotError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(PilotError::authentication("Token cannot be empty"));
        }
        Ok(Self { token })
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn access_token(&self) -> Result<String, PilotError> {
        Ok(self.token.clone())
    }
}

/// Reads the token from an environment variable on every call
pub struct EnvToken {
    var: String,
}

impl EnvToken {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

#[async_trait]
impl TokenProvider for EnvToken {
    async fn access_token(&self) -> Result<String, PilotError> {
        match std::env::var(&self.var) {
            Ok(token) if !token.trim().is_empty() => Ok(token),
            _ => Err(PilotError::authentication(format!(
                "Environment variable {} is not set",
                self.var
            ))),
        }
    }
}
