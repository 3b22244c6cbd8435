//! One prompt's trip through the pipeline.
//!
//! [`Session`] owns the router, the clarification chat, the stream controller
//! and the dispatcher, and keeps a [`StateMachine`] in step with what they do:
//!
//! ```text
//! idle -> routing -> clarifying -> streaming <-> parameter-clarification
//!                 \-------------> streaming -> code-ready -> executing | testing | scheduling
//! ```
//!
//! Any state can fail into `error`; `error` goes back to `idle`.

mod context;
mod state;
mod tracker;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use shared_types::{ActionCompletion, ActionRequest, ParameterAnswer, ParameterForm};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub use context::PromptContext;
pub use state::{SessionState, StateMachine};
pub use tracker::{parameters_from_content, GenerationEvent, GenerationTracker, ParameterSource};

use crate::{
    auth::TokenProvider,
    chat::{ChatReply, ClarificationChat},
    client::PromptService,
    config::{ClientConfig, RetryPolicy},
    dispatch::{ActionDispatcher, ExecutionLog},
    error::PilotError,
    extract::{ExtractedCode, ExtractionSource},
    http::ApiClient,
    notify::{Notice, Notifier},
    router::{PromptRouter, RouteDecision, RoutingMode},
    stream::{StreamController, StreamOutcome, WsConnector},
};

/// Result of [`Session::begin`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Begin {
    pub decision: RouteDecision,
    /// First assistant question when the prompt went to clarification
    pub first_reply: Option<ChatReply>,
}

pub struct Session {
    machine: StateMachine,
    service: Arc<dyn PromptService>,
    router: PromptRouter,
    streams: StreamController,
    dispatcher: ActionDispatcher,
    notifier: Arc<dyn Notifier>,
    chat_retry: RetryPolicy,
    chat: Option<ClarificationChat>,
    context: Option<PromptContext>,
    form: Option<ParameterForm>,
    code: Option<ExtractedCode>,
    events: Option<mpsc::UnboundedReceiver<GenerationEvent>>,
    /// The running stream only lists parameters
    identify_only: bool,
}

impl Session {
    pub fn new(
        service: Arc<dyn PromptService>,
        streams: StreamController,
        dispatcher: ActionDispatcher,
        notifier: Arc<dyn Notifier>,
        config: &ClientConfig,
    ) -> Self {
        Self {
            machine: StateMachine::default(),
            router: PromptRouter::new(service.clone(), notifier.clone(), config),
            service,
            streams,
            dispatcher,
            notifier,
            chat_retry: config.chat_retry.clone(),
            chat: None,
            context: None,
            form: None,
            code: None,
            events: None,
            identify_only: false,
        }
    }

    /// Session wired to the real backend over HTTP and WebSocket
    pub fn connect(
        config: &ClientConfig,
        tokens: Arc<dyn TokenProvider>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, PilotError> {
        let api = ApiClient::new(config, tokens.clone())?;
        let streams = StreamController::new(Arc::new(WsConnector), tokens, notifier.clone(), config);
        let dispatcher = ActionDispatcher::new(api.clone(), notifier.clone(), config);
        Ok(Self::new(Arc::new(api), streams, dispatcher, notifier, config))
    }

    pub fn state(&self) -> SessionState {
        self.machine.state()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.machine.last_error()
    }

    pub fn context(&self) -> Option<&PromptContext> {
        self.context.as_ref()
    }

    pub fn chat(&self) -> Option<&ClarificationChat> {
        self.chat.as_ref()
    }

    /// Parameter form waiting for answers, if any
    pub fn form(&self) -> Option<&ParameterForm> {
        self.form.as_ref()
    }

    pub fn code(&self) -> Option<&ExtractedCode> {
        self.code.as_ref()
    }

    /// Route a new prompt.
    ///
    /// Reasoning prompts open a clarification chat and return its first
    /// question; the others are optimized and ready for [`Session::generate`].
    pub async fn begin(&mut self, prompt: &str, mode: RoutingMode) -> Result<Begin, PilotError> {
        self.machine.transition(SessionState::Routing)?;
        let result = self.route_and_prepare(prompt, mode).await;
        if let Err(e) = &result {
            self.machine.fail(e.to_string());
        }
        result
    }

    async fn route_and_prepare(&mut self, prompt: &str, mode: RoutingMode) -> Result<Begin, PilotError> {
        let decision = self.router.route(prompt, mode).await?;

        if decision.needs_reasoning {
            let first_reply = self.open_chat(prompt, true).await?;
            return Ok(Begin {
                decision,
                first_reply: Some(first_reply),
            });
        }

        let optimized = self.router.optimize(prompt).await?;
        self.context = Some(PromptContext::new(
            prompt.trim().to_string(),
            optimized.text,
            false,
        ));
        Ok(Begin {
            decision,
            first_reply: None,
        })
    }

    /// Clarify an optimize-mode prompt before generating
    pub async fn clarify(&mut self) -> Result<ChatReply, PilotError> {
        let prompt = match (&self.context, self.machine.state()) {
            (Some(context), SessionState::Routing) => context.original_prompt.clone(),
            _ => {
                return Err(PilotError::InvalidTransition {
                    from: self.machine.state().to_string(),
                    to: SessionState::Clarifying.to_string(),
                })
            }
        };
        self.open_chat(&prompt, false).await
    }

    async fn open_chat(&mut self, prompt: &str, needs_reasoning: bool) -> Result<ChatReply, PilotError> {
        let mut chat = ClarificationChat::new(
            self.service.clone(),
            self.notifier.clone(),
            self.chat_retry.clone(),
            prompt.trim(),
            needs_reasoning,
        )?;
        let first_reply = chat.start().await?;
        self.chat = Some(chat);
        self.machine.transition(SessionState::Clarifying)?;
        Ok(first_reply)
    }

    pub async fn send_chat(&mut self, text: &str) -> Result<ChatReply, PilotError> {
        match (&mut self.chat, self.machine.state()) {
            (Some(chat), SessionState::Clarifying) => chat.send(text).await,
            _ => Err(PilotError::invalid_request("No clarification in progress")),
        }
    }

    /// Stream code for the current prompt, superseding any running stream
    pub async fn generate(&mut self) -> Result<(), PilotError> {
        self.start_stream(false).await
    }

    /// Ask the server to list the parameters it needs instead of writing code
    pub async fn identify_parameters(&mut self) -> Result<(), PilotError> {
        self.start_stream(true).await
    }

    async fn start_stream(&mut self, identify_only: bool) -> Result<(), PilotError> {
        let state = self.machine.state();
        if !state.can_transition_to(SessionState::Streaming) {
            return Err(PilotError::InvalidTransition {
                from: state.to_string(),
                to: SessionState::Streaming.to_string(),
            });
        }

        if state == SessionState::Clarifying {
            if let Some(chat) = &self.chat {
                let finalized = chat.finalize()?;
                self.context = Some(finalized);
            }
        }

        let Some(context) = &self.context else {
            return Err(PilotError::invalid_request("There is no prompt to generate from"));
        };
        let mut request = context.stream_request();
        if identify_only {
            request = request.identify_parameters();
        }

        let (tracker, events) = GenerationTracker::new(identify_only);
        self.events = None;
        self.form = None;
        self.code = None;

        match self.streams.submit(request, Box::new(tracker)).await {
            Ok(handle) => {
                tracing::info!(stream_id = %handle.id(), identify_only, "Generation started");
                self.events = Some(events);
                self.identify_only = identify_only;
                self.machine.transition(SessionState::Streaming)
            }
            Err(e) => {
                self.machine.fail(e.to_string());
                Err(e)
            }
        }
    }

    /// Next event from the running generation, applied to the session state.
    ///
    /// `None` once the stream has ended and every event was delivered.
    pub async fn next_event(&mut self) -> Option<GenerationEvent> {
        let event = self.events.as_mut()?.recv().await?;
        self.apply(&event);
        Some(event)
    }

    fn apply(&mut self, event: &GenerationEvent) {
        match event {
            GenerationEvent::ParametersRequested { parameters, .. } => {
                self.form = Some(ParameterForm::new(parameters.clone()));
                self.step(SessionState::ParameterClarification);
            }
            GenerationEvent::Finished(extracted) => {
                if extracted.is_placeholder() {
                    self.notifier
                        .notify(Notice::warning("No code was found in the response. You can regenerate."));
                }
                self.code = Some(extracted.clone());
                self.step(SessionState::CodeReady);
            }
            GenerationEvent::Failed(reason) => {
                self.machine.fail(format!("Code generation failed: {}", reason));
            }
            GenerationEvent::ParametersFailed(reason) => {
                let message = format!("Parameter identification failed: {}", reason);
                self.notifier.notify(Notice::error(message.clone()));
                self.machine.fail(message);
            }
            GenerationEvent::Ended(outcome) => {
                if self.machine.state() != SessionState::Streaming {
                    return;
                }
                match outcome {
                    StreamOutcome::Failed(reason) => self.machine.fail(reason.clone()),
                    StreamOutcome::Disconnected => {
                        self.machine.fail("The connection closed before code was generated")
                    }
                    StreamOutcome::Completed => {
                        self.machine.fail("The generator finished without producing a result")
                    }
                    StreamOutcome::Closed => {}
                }
            }
            GenerationEvent::Text(_) | GenerationEvent::Code(_) | GenerationEvent::Activity(_) => {}
        }
    }

    fn step(&mut self, next: SessionState) {
        if let Err(e) = self.machine.transition(next) {
            tracing::warn!("Ignoring stream event: {}", e);
        }
    }

    /// Answer the parameter form.
    ///
    /// A paused stream is resumed. After parameter identification, or when the
    /// stream already ended, generation starts again with the values in the prompt.
    pub async fn submit_parameters(&mut self, answers: Vec<ParameterAnswer>) -> Result<(), PilotError> {
        self.record_answers(answers)?;

        let resumed = !self.identify_only
            && self
                .streams
                .active()
                .filter(|handle| !handle.is_finished())
                .is_some_and(|handle| handle.resume());

        if resumed {
            self.form = None;
            self.machine.transition(SessionState::Streaming)
        } else {
            self.start_stream(false).await
        }
    }

    /// Drop the paused stream and generate again with the answers in the prompt
    pub async fn regenerate_with_parameters(&mut self, answers: Vec<ParameterAnswer>) -> Result<(), PilotError> {
        self.record_answers(answers)?;
        self.start_stream(false).await
    }

    fn record_answers(&mut self, answers: Vec<ParameterAnswer>) -> Result<(), PilotError> {
        if self.machine.state() != SessionState::ParameterClarification {
            return Err(PilotError::InvalidTransition {
                from: self.machine.state().to_string(),
                to: SessionState::Streaming.to_string(),
            });
        }
        let Some(form) = &self.form else {
            return Err(PilotError::internal("No parameter form is open"));
        };
        form.validate(&answers).map_err(PilotError::invalid_request)?;
        let resolved = form.resolve(&answers);

        let context = self
            .context
            .take()
            .ok_or_else(|| PilotError::internal("Parameter form without a prompt"))?;
        self.context = Some(context.with_parameters(resolved));
        Ok(())
    }

    /// Replace the generated code, e.g. after the user edited it
    pub fn set_code(&mut self, code: impl Into<String>) -> Result<(), PilotError> {
        if self.machine.state() != SessionState::CodeReady {
            return Err(PilotError::invalid_request("There is no generated code to edit"));
        }
        let code = code.into();
        if code.trim().is_empty() {
            return Err(PilotError::invalid_request("Code cannot be empty"));
        }
        self.code = Some(ExtractedCode {
            code,
            source: ExtractionSource::Edited,
        });
        Ok(())
    }

    pub async fn execute(&mut self, log: &mut ExecutionLog, cancel: &CancellationToken) -> Result<(), PilotError> {
        let request = self.begin_action(SessionState::Executing)?;
        let result = self.dispatcher.execute(&request, log, cancel).await;
        self.machine.transition(SessionState::CodeReady)?;
        result
    }

    pub async fn test(&mut self, cancel: &CancellationToken) -> Result<ActionCompletion, PilotError> {
        let request = self.begin_action(SessionState::Testing)?;
        let result = self.dispatcher.test(&request, cancel).await;
        self.machine.transition(SessionState::CodeReady)?;
        result
    }

    pub async fn schedule(&mut self, cancel: &CancellationToken) -> Result<ActionCompletion, PilotError> {
        let request = self.begin_action(SessionState::Scheduling)?;
        let result = self.dispatcher.schedule(&request, cancel).await;
        self.machine.transition(SessionState::CodeReady)?;
        result
    }

    fn begin_action(&mut self, action_state: SessionState) -> Result<ActionRequest, PilotError> {
        let request = match (&self.context, &self.code) {
            (Some(context), Some(code)) => context.action_request(code.code.clone()),
            _ => {
                return Err(PilotError::InvalidTransition {
                    from: self.machine.state().to_string(),
                    to: action_state.to_string(),
                })
            }
        };
        self.machine.transition(action_state)?;
        Ok(request)
    }

    /// Close any stream and forget the prompt
    pub async fn reset(&mut self) {
        if let Some(outcome) = self.streams.teardown().await {
            tracing::debug!(?outcome, "Stream closed on reset");
        }
        self.chat = None;
        self.context = None;
        self.form = None;
        self.code = None;
        self.events = None;
        self.identify_only = false;
        self.machine.reset();
    }
}
