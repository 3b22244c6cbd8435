//! Command implementations for the promptpilot CLI

pub mod agents;
pub mod config;
pub mod console;
pub mod generate;
pub mod prompt;

pub use agents::*;
pub use self::config::*;
pub use generate::*;
pub use prompt::*;
