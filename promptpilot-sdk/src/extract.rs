use std::sync::OnceLock;

use regex::Regex;

/// Returned when nothing in the response looks like code
pub const PLACEHOLDER: &str = "# No code could be extracted from the response";

/// Lead-in phrases models use right before the code
const NARRATIVE_MARKERS: &[&str] = &[
    "here is the complete code",
    "here's the complete code",
    "here is the python code",
    "here's the python code",
    "here is the updated code",
    "here's the updated code",
    "here is the code",
    "here's the code",
    "here is the script",
    "here's the script",
    "here is the implementation",
    "here's the implementation",
    "below is the code",
    "the following code",
];

/// Characters after a lead-in phrase checked for an opening fence
const FENCE_LOOKAHEAD: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionSource {
    Fenced,
    CodeStart,
    Narrative,
    Placeholder,
    /// Replaced by the user after generation
    Edited,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedCode {
    pub code: String,
    pub source: ExtractionSource,
}

impl ExtractedCode {
    pub fn is_placeholder(&self) -> bool {
        self.source == ExtractionSource::Placeholder
    }
}

struct Patterns {
    fence: Regex,
    code_start: Regex,
    narrative: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let markers: Vec<String> = NARRATIVE_MARKERS.iter().map(|m| regex::escape(m)).collect();
        Patterns {
            fence: Regex::new(r"```(?:[\w+.-]*[ \t]*\n)?([\s\S]*?)```").unwrap(),
            code_start: Regex::new(
                r"\b(?:import\s+[A-Za-z_]|from\s+[\w.]+\s+import\b|def\s+[A-Za-z_]\w*\s*\(|class\s+[A-Za-z_]\w*)",
            )
            .unwrap(),
            narrative: Regex::new(&format!("(?i)(?:{})", markers.join("|"))).unwrap(),
        }
    })
}

/// Pull the generated program out of a full model response.
///
/// Tried in order: every fenced block, the first Python-looking statement,
/// the text after a narrative lead-in, and finally [`PLACEHOLDER`].
pub fn extract_code(response: &str) -> ExtractedCode {
    if let Some(code) = fenced_blocks(response) {
        return ExtractedCode {
            code,
            source: ExtractionSource::Fenced,
        };
    }

    if let Some(m) = patterns().code_start.find(response) {
        return ExtractedCode {
            code: response[m.start()..].to_string(),
            source: ExtractionSource::CodeStart,
        };
    }

    if let Some(code) = after_narrative_marker(response) {
        return ExtractedCode {
            code,
            source: ExtractionSource::Narrative,
        };
    }

    tracing::warn!(len = response.len(), "No code found in generator response");
    ExtractedCode {
        code: PLACEHOLDER.to_string(),
        source: ExtractionSource::Placeholder,
    }
}

fn fenced_blocks(response: &str) -> Option<String> {
    let blocks: Vec<&str> = patterns()
        .fence
        .captures_iter(response)
        .filter_map(|caps| caps.get(1))
        .map(|body| body.as_str().trim())
        .filter(|body| !body.is_empty())
        .collect();

    if blocks.is_empty() {
        None
    } else {
        Some(blocks.join("\n\n"))
    }
}

fn after_narrative_marker(response: &str) -> Option<String> {
    for m in patterns().narrative.find_iter(response) {
        let rest = &response[m.end()..];
        let lookahead: String = rest.chars().take(FENCE_LOOKAHEAD).collect();
        if lookahead.contains("```") {
            continue;
        }

        let text = rest.trim_start_matches(|c: char| c == ':' || c == '.' || c.is_whitespace());
        let text = text.trim_end();
        if !text.is_empty() {
            return Some(text.to_string());
        }
    }
    None
}
