use std::sync::Arc;

use shared_types::{ChatMessage, ChatRole};

use crate::{
    client::PromptService,
    config::RetryPolicy,
    error::PilotError,
    notify::{Notice, Notifier},
    session::PromptContext,
};


/// Canned replies used when the reasoning endpoint keeps failing.
///
/// Picked by `retry_count % FALLBACK_REPLIES.len()`.
pub const FALLBACK_REPLIES: [&str; 5] = [
    "Could you tell me more about the inputs this agent will work with?",
    "What should the agent produce when it finishes, and where should the result go?",
    "Does the agent need access to any services, accounts or APIs?",
    "How often should this run, or is it a one-off task?",
    "Is there anything the agent must avoid, or any limits it should respect?",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatPhase {
    /// Only the initial prompt is known
    Seeded,
    /// At least one exchange happened, not enough to submit
    Active,
    /// The minimum number of turns was reached
    SubmitReady,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub content: String,
    /// The reply is a canned fallback, not from the backend
    pub fallback: bool,
}

/// Multi-turn clarification of a prompt before generation.
///
/// Every user message is answered by exactly one assistant message, either
/// from the reasoning endpoint or, after retries run out, from
/// [`FALLBACK_REPLIES`].
pub struct ClarificationChat {
    service: Arc<dyn PromptService>,
    notifier: Arc<dyn Notifier>,
    policy: RetryPolicy,
    original_prompt: String,
    needs_reasoning: bool,
    messages: Vec<ChatMessage>,
    turns: usize,
    retry_count: usize,
    suggested: bool,
}

impl ClarificationChat {
    pub fn new(
        service: Arc<dyn PromptService>,
        notifier: Arc<dyn Notifier>,
        policy: RetryPolicy,
        original_prompt: impl Into<String>,
        needs_reasoning: bool,
    ) -> Result<Self, PilotError> {
        let original_prompt = original_prompt.into();
        if original_prompt.trim().is_empty() {
            return Err(PilotError::invalid_request("Prompt cannot be empty."));
        }

        Ok(Self {
            service,
            notifier,
            policy,
            original_prompt,
            needs_reasoning,
            messages: Vec::new(),
            turns: 0,
            retry_count: 0,
            suggested: false,
        })
    }

    pub fn phase(&self) -> ChatPhase {
        if self.turns == 0 {
            ChatPhase::Seeded
        } else if self.turns < self.min_turns() {
            ChatPhase::Active
        } else {
            ChatPhase::SubmitReady
        }
    }

    /// Turns required before [`Self::finalize`] succeeds
    pub fn min_turns(&self) -> usize {
        if self.needs_reasoning {
            5
        } else {
            3
        }
    }

    /// Turns after which submission is suggested to the user
    pub fn suggest_turns(&self) -> usize {
        if self.needs_reasoning {
            7
        } else {
            5
        }
    }

    pub fn turns(&self) -> usize {
        self.turns
    }

    pub fn retry_count(&self) -> usize {
        self.retry_count
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn original_prompt(&self) -> &str {
        &self.original_prompt
    }

    pub fn can_submit(&self) -> bool {
        self.phase() == ChatPhase::SubmitReady
    }

    pub fn should_suggest_submit(&self) -> bool {
        self.turns >= self.suggest_turns()
    }

    /// Open the conversation by sending the original prompt as the first turn
    pub async fn start(&mut self) -> Result<ChatReply, PilotError> {
        if self.phase() != ChatPhase::Seeded {
            return Err(PilotError::invalid_request("Conversation already started"));
        }
        let prompt = self.original_prompt.clone();
        self.send(&prompt).await
    }

    /// Send one user message and wait for the assistant's answer.
    ///
    /// Endpoint failures never surface here: after the retry budget is spent
    /// a fallback reply is recorded instead and a warning notice is emitted.
    pub async fn send(&mut self, text: &str) -> Result<ChatReply, PilotError> {
        if text.trim().is_empty() {
            return Err(PilotError::invalid_request("Message cannot be empty"));
        }

        self.messages.push(ChatMessage::user(text.trim()));
        let transcript = self.render_transcript();

        let reply = match self.request_with_retry(&transcript).await {
            Some(content) => ChatReply {
                content,
                fallback: false,
            },
            None => {
                let content = FALLBACK_REPLIES[self.retry_count % FALLBACK_REPLIES.len()].to_string();
                self.notifier.notify(Notice::warning(
                    "The assistant is not responding; showing a suggested follow-up question instead.",
                ));
                ChatReply {
                    content,
                    fallback: true,
                }
            }
        };

        self.messages.push(ChatMessage::assistant(reply.content.clone()));
        self.turns += 1;

        if self.should_suggest_submit() && !self.suggested {
            self.suggested = true;
            self.notifier.notify(Notice::info(
                "This looks like enough detail. You can submit the prompt whenever you are ready.",
            ));
        }

        Ok(reply)
    }

    async fn request_with_retry(&mut self, transcript: &str) -> Option<String> {
        for attempt in 1..=self.policy.max_attempts {
            match self.service.reasoning_turn(transcript).await {
                Ok(reply) => return Some(reply),
                Err(e) => {
                    self.retry_count += 1;
                    tracing::warn!(
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        "Clarification turn failed: {}",
                        e
                    );
                    if attempt < self.policy.max_attempts {
                        tokio::time::sleep(self.policy.delay_for(attempt)).await;
                    }
                }
            }
        }
        None
    }

    /// Transcript sent to the reasoning endpoint on every turn
    pub fn render_transcript(&self) -> String {
        let mut out = String::from(
            "You are helping a user describe an automation agent that will be generated as Python code. \
             Ask one short follow-up question at a time about anything still unclear.\n\n",
        );
        for message in &self.messages {
            out.push_str(&format!("{}: {}\n", message.role, message.content));
        }
        out
    }

    /// Produce the prompt context for generation once enough turns happened
    pub fn finalize(&self) -> Result<PromptContext, PilotError> {
        if !self.can_submit() {
            return Err(PilotError::invalid_request(format!(
                "At least {} turns are needed before submitting ({} so far)",
                self.min_turns(),
                self.turns
            )));
        }

        Ok(PromptContext::new(
            self.original_prompt.clone(),
            compose_clarified_prompt(&self.original_prompt, &self.messages),
            self.needs_reasoning,
        ))
    }
}

/// Original prompt followed by the clarification exchange
fn compose_clarified_prompt(original: &str, messages: &[ChatMessage]) -> String {
    let mut out = original.trim().to_string();

    // The first user message repeats the original prompt
    let rest = match messages.first() {
        Some(first) if first.role == ChatRole::User && first.content == original.trim() => &messages[1..],
        _ => messages,
    };

    if !rest.is_empty() {
        out.push_str("\n\nClarifications:\n");
        for message in rest {
            let label = match message.role {
                ChatRole::Assistant => "Q",
                ChatRole::User => "A",
            };
            out.push_str(&format!("{}: {}\n", label, message.content));
        }
    }
    out
}
