//! Saved agent management

use std::path::Path;

use anyhow::Context;
use promptpilot_sdk::agents::AgentsApi;
use promptpilot_sdk::http::ApiClient;
use shared_types::{Agent, SaveAgentRequest};

use crate::cli::AgentCommands;
use crate::config::PilotConfig;
use crate::error::CliError;

pub async fn handle_agents_command(config: &PilotConfig, action: &AgentCommands) -> Result<(), CliError> {
    let client_config = config.client_config()?;
    let mut agents = AgentsApi::new(ApiClient::new(&client_config, config.token_provider()?)?);

    match action {
        AgentCommands::List => {
            let listed = agents.list().await?;
            if listed.is_empty() {
                println!("No agents saved yet.");
            }
            for agent in listed {
                println!("{}", agent_line(agent));
            }
        }
        AgentCommands::Delete { id } => {
            agents.delete(id).await?;
            println!("Deleted agent {}", id.trim());
        }
        AgentCommands::Run { prompt } => {
            let completion = agents.execute_prompt(prompt).await?;
            println!("status: {}", completion.status);
            if !completion.message.is_empty() {
                println!("{}", completion.message);
            }
        }
        AgentCommands::Save {
            name,
            file,
            prompt_id,
            description,
        } => {
            let agent_code = read_agent_code(file)?;
            let saved = agents
                .save(&SaveAgentRequest {
                    prompt_id: prompt_id.clone(),
                    name: name.clone(),
                    description: description.clone(),
                    status: "active".to_string(),
                    agent_code,
                })
                .await?;
            println!("Saved agent {} ({})", saved.name, saved.id);
        }
    }
    Ok(())
}

fn read_agent_code(file: &Path) -> Result<String, CliError> {
    let code = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read agent code from {}", file.display()))?;
    if code.trim().is_empty() {
        return Err(CliError::Command(format!("{} is empty", file.display())));
    }
    Ok(code)
}

/// `id  name  [status]  description`
fn agent_line(agent: &Agent) -> String {
    let mut line = format!("{}  {}  [{}]", agent.id, agent.name, agent.status);
    if let Some(description) = agent.description.as_deref().filter(|d| !d.is_empty()) {
        line.push_str("  ");
        line.push_str(description);
    }
    line
}
