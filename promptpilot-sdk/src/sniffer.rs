//! Detects a generator that asks for missing details instead of writing code.
//!
//! Everything here is heuristic: the parameters found are a hint for the user,
//! not a contract with the server.

use std::sync::OnceLock;

use regex::Regex;
use shared_types::MissingParameter;

/// Text shorter than this is never inspected
pub const MIN_TEXT_LEN: usize = 100;

const ASKING_PATTERNS: &[&str] = &[
    r"\b(?:could|can|would) you (?:please )?(?:provide|tell|share|specify|confirm|clarify|let me know)\b",
    r"\bplease (?:provide|specify|share|tell me|confirm|clarify|let me know)\b",
    r"\bi(?: would| will)? need (?:to know|more information|some information|more details|a few details|the following)\b",
    r"\bbefore i (?:can )?(?:write|generate|create|build|proceed)\b",
    r"\b(?:missing|required|additional) (?:information|details|parameters)\b",
    r"\bwhat is (?:the|your)\b",
    r"\bwhich \w+(?: \w+)? (?:would you like|do you want|should i)\b",
];

/// First matching row wins
const KEYWORD_TABLE: &[(&[&str], &str)] = &[
    (&["google drive", "file id", "document id", "doc id", "drive file"], "document_id"),
    (&["spreadsheet", "sheet id", "google sheet"], "spreadsheet_id"),
    (&["folder"], "folder_id"),
    (&["recipient", "send it to", "send the", "who should"], "recipient"),
    (&["email address", "e-mail", "email"], "email_address"),
    (&["api key", "access token", "token", "credential"], "api_key"),
    (&["slack", "channel"], "channel"),
    (&["how often", "frequency", "what time", "schedule", "when should"], "schedule"),
    (&["url", "website", "endpoint", "link"], "url"),
    (&["repository", "repo"], "repository"),
    (&["database", "table name"], "database"),
    (&["city", "location", "timezone", "time zone"], "location"),
];

struct Patterns {
    asking: Regex,
    question: Regex,
    list_marker: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        asking: Regex::new(&format!("(?i)(?:{})", ASKING_PATTERNS.join("|"))).unwrap(),
        question: Regex::new(r"[^.!?\n]+\?").unwrap(),
        list_marker: Regex::new(r"^\s*(?:[-*#]+|\d+[.)])\s*").unwrap(),
    })
}

/// Parameters the generator seems to be asking for, if any.
///
/// Returns `None` for short text, text without any "asking for information"
/// phrasing, or text without a single question.
pub fn detect_parameter_request(accumulated: &str) -> Option<Vec<MissingParameter>> {
    if accumulated.chars().count() <= MIN_TEXT_LEN {
        return None;
    }

    let patterns = patterns();
    if !patterns.asking.is_match(accumulated) {
        return None;
    }

    let mut parameters: Vec<MissingParameter> = Vec::new();
    let questions = patterns
        .question
        .find_iter(accumulated)
        .map(|m| clean_question(m.as_str()))
        .filter(|q| q.len() > 1);

    for (index, question) in questions.enumerate() {
        let name = parameter_name(&question).map_or_else(|| format!("param_{}", index + 1), str::to_string);

        match parameters.iter_mut().find(|p| p.name == name) {
            Some(existing) => {
                existing.description.push(' ');
                existing.description.push_str(&question);
            }
            None => parameters.push(MissingParameter {
                name,
                description: question,
                default: None,
                required: true,
            }),
        }
    }

    if parameters.is_empty() {
        None
    } else {
        tracing::debug!(count = parameters.len(), "Parameter request detected");
        Some(parameters)
    }
}

/// Strip list markers and markdown emphasis left before the question
fn clean_question(raw: &str) -> String {
    patterns()
        .list_marker
        .replace(raw, "")
        .replace("**", "")
        .trim()
        .to_string()
}

fn parameter_name(question: &str) -> Option<&'static str> {
    let lower = question.to_lowercase();
    KEYWORD_TABLE
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(_, name)| *name)
}

/// One-shot guard around [`detect_parameter_request`] for a single stream
#[derive(Debug, Default, Clone)]
pub struct IntentSniffer {
    fired: bool,
    code_finalized: bool,
}

impl IntentSniffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }

    /// Stop inspecting once code has been produced
    pub fn mark_code_finalized(&mut self) {
        self.code_finalized = true;
    }

    /// Inspect the text so far; yields parameters at most once per stream
    pub fn inspect(&mut self, accumulated: &str) -> Option<Vec<MissingParameter>> {
        if self.fired || self.code_finalized {
            return None;
        }
        let parameters = detect_parameter_request(accumulated)?;
        self.fired = true;
        Some(parameters)
    }
}
