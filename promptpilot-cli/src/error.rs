use std::fmt;

use promptpilot_sdk::PilotError;

/// Main error type for the promptpilot CLI
#[derive(Debug)]
pub enum CliError {
    /// Configuration-related errors
    Config(String),
    /// File I/O errors
    Io(std::io::Error),
    /// Failures reported by the pipeline
    Pipeline(PilotError),
    /// Bad input on the command line or at a prompt
    Command(String),
    /// The user interrupted the run
    Interrupted,
    /// Generic errors from anyhow
    Other(anyhow::Error),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {msg}"),
            CliError::Io(err) => write!(f, "I/O error: {err}"),
            CliError::Pipeline(err) => write!(f, "{err}"),
            CliError::Command(msg) => write!(f, "Command error: {msg}"),
            CliError::Interrupted => write!(f, "Interrupted"),
            CliError::Other(err) => write!(f, "Error: {err}"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Io(err) => Some(err),
            CliError::Pipeline(err) => Some(err),
            CliError::Other(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl CliError {
    /// Get the exit code for this error type
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) => 2,
            CliError::Io(_) => 3,
            CliError::Pipeline(PilotError::Authentication { .. }) => 4,
            CliError::Command(_) => 5,
            CliError::Pipeline(PilotError::Timeout { .. })
            | CliError::Pipeline(PilotError::Network { .. })
            | CliError::Pipeline(PilotError::Connection { .. })
            | CliError::Pipeline(PilotError::ConnectionFailed { .. }) => 7,
            CliError::Pipeline(_) => 6,
            CliError::Interrupted => 130,
            CliError::Other(_) => 1,
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io(err)
    }
}

impl From<PilotError> for CliError {
    fn from(err: PilotError) -> Self {
        match err {
            PilotError::Aborted => CliError::Interrupted,
            other => CliError::Pipeline(other),
        }
    }
}

impl From<config::ConfigError> for CliError {
    fn from(err: config::ConfigError) -> Self {
        CliError::Config(err.to_string())
    }
}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        CliError::Other(err)
    }
}

impl From<toml::ser::Error> for CliError {
    fn from(err: toml::ser::Error) -> Self {
        CliError::Other(err.into())
    }
}
