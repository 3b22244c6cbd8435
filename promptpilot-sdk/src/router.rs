use std::sync::Arc;
use std::time::Duration;

use crate::{
    client::PromptService,
    config::ClientConfig,
    error::PilotError,
    notify::{Notice, Notifier},
};

/// How the reasoning flag is decided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingMode {
    /// Ask the classification endpoint
    Auto,
    /// The user picked the mode; no network call
    Manual(bool),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteSource {
    Manual,
    Classified,
    /// Classification failed; the flag is the local default and may be retried
    Fallback { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDecision {
    pub needs_reasoning: bool,
    pub source: RouteSource,
}

impl RouteDecision {
    pub fn is_fallback(&self) -> bool {
        matches!(self.source, RouteSource::Fallback { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizedPrompt {
    pub text: String,
    /// True when the endpoint failed and [`heuristic_optimize`] was used
    pub fallback: bool,
}

/// Decides between the reasoning and optimize flows
pub struct PromptRouter {
    service: Arc<dyn PromptService>,
    notifier: Arc<dyn Notifier>,
    timeout: Duration,
}

impl PromptRouter {
    pub fn new(
        service: Arc<dyn PromptService>,
        notifier: Arc<dyn Notifier>,
        config: &ClientConfig,
    ) -> Self {
        Self {
            service,
            notifier,
            timeout: config.route_timeout,
        }
    }

    /// Decide whether `prompt` needs reasoning.
    ///
    /// Only an empty prompt is an error; endpoint failures degrade to
    /// non-reasoning mode with a warning notice.
    pub async fn route(&self, prompt: &str, mode: RoutingMode) -> Result<RouteDecision, PilotError> {
        ensure_not_blank(prompt)?;

        if let RoutingMode::Manual(needs_reasoning) = mode {
            tracing::debug!(needs_reasoning, "Manual routing selected");
            return Ok(RouteDecision {
                needs_reasoning,
                source: RouteSource::Manual,
            });
        }

        let outcome = tokio::time::timeout(self.timeout, self.service.route_prompt(prompt))
            .await
            .unwrap_or_else(|_| Err(PilotError::timeout("route-prompt", self.timeout.as_secs())));

        match outcome {
            Ok(needs_reasoning) => {
                tracing::info!(needs_reasoning, "Prompt classified");
                Ok(RouteDecision {
                    needs_reasoning,
                    source: RouteSource::Classified,
                })
            }
            Err(e) => {
                tracing::warn!("Prompt routing failed, using optimize mode: {}", e);
                self.notifier.notify(Notice::warning(format!(
                    "Could not reach the routing service ({}). Continuing without reasoning; you can retry.",
                    e
                )));
                Ok(RouteDecision {
                    needs_reasoning: false,
                    source: RouteSource::Fallback {
                        error: e.to_string(),
                    },
                })
            }
        }
    }

    /// Optimize a prompt, falling back to a local rewrite on failure
    pub async fn optimize(&self, prompt: &str) -> Result<OptimizedPrompt, PilotError> {
        ensure_not_blank(prompt)?;

        let outcome = tokio::time::timeout(self.timeout, self.service.optimize_prompt(prompt))
            .await
            .unwrap_or_else(|_| Err(PilotError::timeout("optimize-prompt", self.timeout.as_secs())));

        match outcome {
            Ok(text) if !text.trim().is_empty() => Ok(OptimizedPrompt {
                text,
                fallback: false,
            }),
            Ok(_) => {
                self.notifier
                    .notify(Notice::warning("The optimizer returned nothing; using your prompt as written."));
                Ok(OptimizedPrompt {
                    text: heuristic_optimize(prompt),
                    fallback: true,
                })
            }
            Err(e) => {
                tracing::warn!("Prompt optimization failed: {}", e);
                self.notifier.notify(Notice::warning(format!(
                    "Prompt optimization unavailable ({}); using a local rewrite.",
                    e
                )));
                Ok(OptimizedPrompt {
                    text: heuristic_optimize(prompt),
                    fallback: true,
                })
            }
        }
    }
}

fn ensure_not_blank(prompt: &str) -> Result<(), PilotError> {
    if prompt.trim().is_empty() {
        return Err(PilotError::invalid_request("Prompt cannot be empty."));
    }
    Ok(())
}

/// Local stand-in for the optimizer: normalized text plus a task instruction
pub fn heuristic_optimize(prompt: &str) -> String {
    let normalized = prompt.split_whitespace().collect::<Vec<_>>().join(" ");
    format!(
        "Write a complete, runnable Python script for the following task. \
         Use reasonable defaults for anything unspecified and document them in comments.\n\nTask: {}",
        normalized
    )
}
