//! One-shot routing and optimization commands

use std::sync::Arc;

use promptpilot_sdk::http::ApiClient;
use promptpilot_sdk::router::{PromptRouter, RouteSource, RoutingMode};

use super::console::ConsoleNotifier;
use crate::config::PilotConfig;
use crate::error::CliError;

fn router(config: &PilotConfig) -> Result<PromptRouter, CliError> {
    let client_config = config.client_config()?;
    let api = ApiClient::new(&client_config, config.token_provider()?)?;
    Ok(PromptRouter::new(Arc::new(api), Arc::new(ConsoleNotifier), &client_config))
}

pub async fn route_prompt(config: &PilotConfig, prompt: &str) -> Result<(), CliError> {
    let decision = router(config)?.route(prompt, RoutingMode::Auto).await?;

    let flow = if decision.needs_reasoning { "reasoning" } else { "optimize" };
    match decision.source {
        RouteSource::Fallback { .. } => println!("{} (fallback, classification unavailable)", flow),
        _ => println!("{}", flow),
    }
    Ok(())
}

pub async fn optimize_prompt(config: &PilotConfig, prompt: &str) -> Result<(), CliError> {
    let optimized = router(config)?.optimize(prompt).await?;
    println!("{}", optimized.text);
    Ok(())
}
