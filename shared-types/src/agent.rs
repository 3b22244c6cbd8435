use serde::{Deserialize, Serialize, Serializer};
use ts_rs::TS;

/// Generated agent as stored by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Agent {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub agent_code: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Body of `POST /agents`
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaveAgentRequest {
    pub prompt_id: String,
    pub name: String,
    pub description: Option<String>,
    pub status: String,
    pub agent_code: String,
}

/// Body of `POST /agents/execute`
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ExecutePromptRequest {
    pub prompt: String,
}

/// Body shared by the execute/test/schedule actions.
///
/// The backend reads `needsReasoning` with `.lower() == "true"`, so the flag
/// travels as a string.
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    pub prompt: String,
    pub optimized_prompt: String,
    #[serde(serialize_with = "bool_as_string")]
    #[ts(type = "string")]
    pub needs_reasoning: bool,
    pub code: String,
}

fn bool_as_string<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(if *value { "true" } else { "false" })
}

/// Single JSON completion returned by test/schedule and by `POST /agents/execute`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ActionCompletion {
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}
