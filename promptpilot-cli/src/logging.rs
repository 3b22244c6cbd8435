//! Diagnostics for the CLI go to stderr.
//!
//! stdout is reserved for generated code and agent output, so it can be piped.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::CliError;

/// Directive used when `RUST_LOG` is unset. `--verbose` opens up the SDK's debug events.
fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "info,promptpilot=debug,promptpilot_sdk=debug"
    } else {
        "warn,promptpilot=info,promptpilot_sdk=info"
    }
}

fn build_filter(rust_log: Option<&str>, verbose: bool) -> Result<EnvFilter, CliError> {
    let directive = rust_log
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| default_directive(verbose));
    EnvFilter::try_new(directive).map_err(|e| CliError::Config(format!("Invalid log filter {:?}: {}", directive, e)))
}

/// Install the global subscriber. Fails if one is already set.
pub fn init_logging(verbose: bool) -> Result<(), CliError> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = build_filter(rust_log.as_deref(), verbose)?;

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .compact();

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .try_init()
        .map_err(|e| CliError::Config(format!("Logging already initialized: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rust_log_overrides_verbose_flag() {
        let filter = build_filter(Some("promptpilot_sdk=trace"), false).unwrap();
        assert_eq!(filter.to_string(), "promptpilot_sdk=trace");

        let blank = build_filter(Some("  "), true).unwrap();
        assert!(blank.to_string().contains("promptpilot_sdk=debug"));
    }

    #[test]
    fn test_bad_directive_is_config_error() {
        let err = build_filter(Some("promptpilot=notalevel"), false).unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_init_logging_once() {
        assert!(init_logging(false).is_ok());
        assert!(matches!(init_logging(true), Err(CliError::Config(_))));
    }
}
