use serde_json::Value;
use shared_types::{MissingParameter, StreamKind, StreamMessage};
use tokio::sync::mpsc;

use crate::extract::{extract_code, ExtractedCode};
use crate::sniffer::IntentSniffer;
use crate::stream::{Flow, StreamHandler, StreamOutcome};

/// Where a parameter list came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterSource {
    /// Guessed from the model's questions; the stream is paused
    Sniffed,
    /// Sent by the server in parameter identification mode
    Identified,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GenerationEvent {
    /// Streamed model text
    Text(String),
    /// A code frame
    Code(String),
    /// Tool calls, plans and other progress frames
    Activity(StreamMessage),
    ParametersRequested {
        parameters: Vec<MissingParameter>,
        source: ParameterSource,
    },
    /// `done` arrived; code was extracted from the full response
    Finished(ExtractedCode),
    /// The server reported an error frame
    Failed(String),
    /// Parameter identification failed on the server; carries its reason
    ParametersFailed(String),
    /// The stream is gone; always the last event
    Ended(StreamOutcome),
}

/// Stream handler for one generation run.
///
/// Accumulates the response, runs the intent sniffer over it and forwards
/// everything to the session as [`GenerationEvent`]s.
pub struct GenerationTracker {
    response: String,
    sniffer: IntentSniffer,
    identify_only: bool,
    events: mpsc::UnboundedSender<GenerationEvent>,
}

impl GenerationTracker {
    pub fn new(identify_only: bool) -> (Self, mpsc::UnboundedReceiver<GenerationEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Self {
                response: String::new(),
                sniffer: IntentSniffer::new(),
                identify_only,
                events,
            },
            rx,
        )
    }

    fn emit(&self, event: GenerationEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("Generation event dropped; session moved on");
        }
    }
}

impl StreamHandler for GenerationTracker {
    fn on_message(&mut self, message: StreamMessage) -> Flow {
        tracing::debug!(kind = ?message.kind, phase = ?message.phase, "Stream frame");

        match message.kind {
            StreamKind::Text => {
                let Some(text) = message.content_text() else {
                    return Flow::Continue;
                };
                self.response.push_str(&text);
                self.emit(GenerationEvent::Text(text));

                if let Some(parameters) = self.sniffer.inspect(&self.response) {
                    self.emit(GenerationEvent::ParametersRequested {
                        parameters,
                        source: ParameterSource::Sniffed,
                    });
                    return Flow::Pause;
                }
            }
            StreamKind::Code => {
                if let Some(code) = message.content_text() {
                    self.response.push_str(&code);
                    self.sniffer.mark_code_finalized();
                    self.emit(GenerationEvent::Code(code));
                }
            }
            StreamKind::Parameters => {
                let parameters = message
                    .content
                    .as_ref()
                    .map(parameters_from_content)
                    .unwrap_or_default();
                if parameters.is_empty() {
                    tracing::warn!("Parameter frame without usable parameters");
                } else {
                    self.emit(GenerationEvent::ParametersRequested {
                        parameters,
                        source: ParameterSource::Identified,
                    });
                }
            }
            StreamKind::Done => {
                if !self.identify_only {
                    self.emit(GenerationEvent::Finished(extract_code(&self.response)));
                }
            }
            StreamKind::Error => {
                let reason = message
                    .content_text()
                    .unwrap_or_else(|| "unknown error".to_string());
                self.emit(GenerationEvent::Failed(reason));
            }
            StreamKind::ParametersError => {
                let reason = message
                    .content_text()
                    .filter(|r| !r.trim().is_empty())
                    .unwrap_or_else(|| "no reason given".to_string());
                self.emit(GenerationEvent::ParametersFailed(reason));
            }
            _ => self.emit(GenerationEvent::Activity(message)),
        }
        Flow::Continue
    }

    fn on_end(&mut self, outcome: &StreamOutcome) {
        self.emit(GenerationEvent::Ended(outcome.clone()));
    }
}

/// Parse `{"parameters": [...]}` or a bare array.
///
/// Defaults may be any JSON value and are kept as their text form.
pub fn parameters_from_content(content: &Value) -> Vec<MissingParameter> {
    let items = match content {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("parameters") {
            Some(Value::Array(items)) => items,
            _ => return Vec::new(),
        },
        Value::String(raw) => {
            return serde_json::from_str::<Value>(raw)
                .map(|v| parameters_from_content(&v))
                .unwrap_or_default()
        }
        _ => return Vec::new(),
    };

    items
        .iter()
        .filter_map(|item| {
            let name = item.get("name")?.as_str()?.trim();
            if name.is_empty() {
                return None;
            }
            let default = match item.get("default") {
                None | Some(Value::Null) => None,
                Some(Value::String(s)) => Some(s.clone()),
                Some(other) => Some(other.to_string()),
            };
            Some(MissingParameter {
                name: name.to_string(),
                description: item
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                default,
                required: item.get("required").and_then(Value::as_bool).unwrap_or(true),
            })
        })
        .collect()
}
