use std::fmt;

use crate::error::PilotError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    Routing,
    Clarifying,
    Streaming,
    ParameterClarification,
    CodeReady,
    Executing,
    Testing,
    Scheduling,
    Error,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Routing => "routing",
            SessionState::Clarifying => "clarifying",
            SessionState::Streaming => "streaming",
            SessionState::ParameterClarification => "parameter-clarification",
            SessionState::CodeReady => "code-ready",
            SessionState::Executing => "executing",
            SessionState::Testing => "testing",
            SessionState::Scheduling => "scheduling",
            SessionState::Error => "error",
        }
    }

    /// Whether `next` is reachable in one step
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;

        if next == Error {
            return self != Error;
        }

        matches!(
            (self, next),
            (Idle, Routing)
                | (Routing, Clarifying)
                | (Routing, Streaming)
                | (Clarifying, Streaming)
                // last submission wins
                | (Streaming, Streaming)
                | (Streaming, ParameterClarification)
                | (Streaming, CodeReady)
                | (ParameterClarification, Streaming)
                | (CodeReady, Streaming)
                | (CodeReady, Executing)
                | (CodeReady, Testing)
                | (CodeReady, Scheduling)
                | (CodeReady, Idle)
                | (Executing, CodeReady)
                | (Testing, CodeReady)
                | (Scheduling, CodeReady)
                | (Error, Idle)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current state plus the reason the session last failed
#[derive(Debug, Clone)]
pub struct StateMachine {
    state: SessionState,
    last_error: Option<String>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self {
            state: SessionState::Idle,
            last_error: None,
        }
    }
}

impl StateMachine {
    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn transition(&mut self, next: SessionState) -> Result<(), PilotError> {
        if !self.state.can_transition_to(next) {
            return Err(PilotError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        tracing::debug!(from = %self.state, to = %next, "Session transition");
        if next != SessionState::Error {
            self.last_error = None;
        }
        self.state = next;
        Ok(())
    }

    /// Move to `Error`, keeping the first reason if already failed
    pub fn fail(&mut self, reason: impl Into<String>) {
        if self.state == SessionState::Error {
            return;
        }
        let reason = reason.into();
        tracing::warn!(from = %self.state, "Session failed: {}", reason);
        self.state = SessionState::Error;
        self.last_error = Some(reason);
    }

    /// Back to `Idle` from wherever the session is
    pub fn reset(&mut self) {
        self.state = SessionState::Idle;
        self.last_error = None;
    }
}
