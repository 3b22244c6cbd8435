//! Terminal input and notice rendering shared by the interactive commands

use std::io::Write;

use promptpilot_sdk::notify::{Notice, NoticeLevel, Notifier};
use shared_types::{MissingParameter, ParameterAnswer};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use crate::error::CliError;

/// Prints notices to stderr so they never mix with generated code
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, notice: Notice) {
        eprintln!("{}", render_notice(&notice));
    }
}

pub fn render_notice(notice: &Notice) -> String {
    let tag = match notice.level {
        NoticeLevel::Info => "info",
        NoticeLevel::Warning => "warning",
        NoticeLevel::Error => "error",
    };
    format!("[{}] {}", tag, notice.message)
}

/// Line-oriented reader over stdin
pub struct LineReader {
    lines: Lines<BufReader<Stdin>>,
}

impl LineReader {
    pub fn stdin() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    /// Print `label` and read one trimmed line; `None` at end of input
    pub async fn ask(&mut self, label: &str) -> Result<Option<String>, CliError> {
        eprint!("{}", label);
        std::io::stderr().flush()?;
        Ok(self.lines.next_line().await?.map(|line| line.trim().to_string()))
    }

    /// Ask for every parameter in turn, offering the default where there is one
    pub async fn ask_parameters(&mut self, parameters: &[MissingParameter]) -> Result<Vec<ParameterAnswer>, CliError> {
        eprintln!("The generator needs a few values:");
        let mut answers = Vec::with_capacity(parameters.len());
        for parameter in parameters {
            let Some(value) = self.ask(&parameter_label(parameter)).await? else {
                return Err(CliError::Interrupted);
            };
            if !value.is_empty() {
                answers.push(ParameterAnswer {
                    name: parameter.name.clone(),
                    value,
                });
            }
        }
        Ok(answers)
    }
}

/// `name (description) [default]: `
pub fn parameter_label(parameter: &MissingParameter) -> String {
    let mut label = parameter.name.clone();
    if !parameter.description.is_empty() {
        label.push_str(&format!(" ({})", parameter.description));
    }
    if let Some(default) = &parameter.default {
        label.push_str(&format!(" [{}]", default));
    } else if !parameter.required {
        label.push_str(" [optional]");
    }
    label.push_str(": ");
    label
}
