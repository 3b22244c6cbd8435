use crate::error::PilotError;
use async_trait::async_trait;

/// Backend calls used by the router and the clarification chat.
///
/// [`crate::http::ApiClient`] is the real implementation; tests substitute
/// in-memory mocks.
#[async_trait]
pub trait PromptService: Send + Sync {
    /// Classify a prompt: `true` when it needs the multi-turn reasoning flow
    async fn route_prompt(&self, prompt: &str) -> Result<bool, PilotError>;

    /// Rewrite a prompt so a code generator can act on it directly
    async fn optimize_prompt(&self, prompt: &str) -> Result<String, PilotError>;

    /// Send one clarification turn (the rendered transcript) and get the reply
    async fn reasoning_turn(&self, transcript: &str) -> Result<String, PilotError>;
}
