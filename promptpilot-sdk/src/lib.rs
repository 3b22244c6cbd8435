//! # PromptPilot SDK
//!
//! Client side of the prompt-to-agent pipeline: route a prompt, clarify it,
//! stream generated code over a WebSocket, then execute, test or schedule
//! the result.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use promptpilot_sdk::{
//!     auth::EnvToken, config::ClientConfig, notify::TracingNotifier, router::RoutingMode,
//!     session::{GenerationEvent, Session},
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::default();
//!     let mut session = Session::connect(
//!         &config,
//!         Arc::new(EnvToken::new("PROMPTPILOT_TOKEN")),
//!         Arc::new(TracingNotifier),
//!     )?;
//!
//!     session.begin("Email me the weather every morning", RoutingMode::Manual(false)).await?;
//!     session.generate().await?;
//!
//!     while let Some(event) = session.next_event().await {
//!         if let GenerationEvent::Finished(code) = event {
//!             println!("{}", code.code);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod agents;
pub mod auth;
pub mod chat;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod extract;
pub mod http;
pub mod notify;
pub mod router;
pub mod session;
pub mod sniffer;
pub mod stream;

#[cfg(test)]
mod test_support;

pub use config::ClientConfig;
pub use error::PilotError;
pub use session::{Session, SessionState};
