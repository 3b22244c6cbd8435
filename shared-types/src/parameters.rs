// Parameter form types shared between the sdk, the cli and the web UI

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// A value the model appears to be asking for before it can write code.
///
/// These are guessed from question text, so treat them as a form hint only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MissingParameter {
    /// snake_case name, either a known parameter or `param_N`
    pub name: String,
    /// The question text or a short explanation
    pub description: String,
    /// Suggested value, if any
    #[serde(default)]
    pub default: Option<String>,
    pub required: bool,
}

/// Form surfaced to the user while the stream is paused
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ParameterForm {
    pub parameters: Vec<MissingParameter>,
}

/// A user's answer for one parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ParameterAnswer {
    pub name: String,
    pub value: String,
}

impl ParameterForm {
    pub fn new(parameters: Vec<MissingParameter>) -> Self {
        Self { parameters }
    }

    /// Check a set of answers against the form.
    ///
    /// Required parameters need a non-blank answer unless they carry a default;
    /// answers for unknown names are rejected.
    pub fn validate(&self, answers: &[ParameterAnswer]) -> Result<(), String> {
        for answer in answers {
            if !self.parameters.iter().any(|p| p.name == answer.name) {
                return Err(format!("Unknown parameter: {}", answer.name));
            }
        }

        for param in self.parameters.iter().filter(|p| p.required) {
            let answered = answers
                .iter()
                .any(|a| a.name == param.name && !a.value.trim().is_empty());
            if !answered && param.default.is_none() {
                return Err(format!("Missing value for required parameter '{}'", param.name));
            }
        }

        Ok(())
    }

    /// Merge answers with defaults, in form order
    pub fn resolve(&self, answers: &[ParameterAnswer]) -> Vec<ParameterAnswer> {
        self.parameters
            .iter()
            .filter_map(|param| {
                let answered = answers
                    .iter()
                    .find(|a| a.name == param.name && !a.value.trim().is_empty())
                    .map(|a| a.value.trim().to_string());
                answered.or_else(|| param.default.clone()).map(|value| ParameterAnswer {
                    name: param.name.clone(),
                    value,
                })
            })
            .collect()
    }
}
