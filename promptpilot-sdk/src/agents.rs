use shared_types::{ActionCompletion, Agent, ExecutePromptRequest, SaveAgentRequest};

use crate::{error::PilotError, http::ApiClient};

/// Client-side copy of the user's agents, in server order
#[derive(Debug, Default, Clone)]
pub struct AgentCache {
    agents: Vec<Agent>,
}

impl AgentCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, agents: Vec<Agent>) {
        self.agents = agents;
    }

    /// Insert, or overwrite the entry with the same id in place
    pub fn upsert(&mut self, agent: Agent) {
        match self.agents.iter_mut().find(|a| a.id == agent.id) {
            Some(existing) => *existing = agent,
            None => self.agents.push(agent),
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<Agent> {
        let index = self.agents.iter().position(|a| a.id == id)?;
        Some(self.agents.remove(index))
    }

    pub fn get(&self, id: &str) -> Option<&Agent> {
        self.agents.iter().find(|a| a.id == id)
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

/// Saved agents on the backend, mirrored into an [`AgentCache`]
pub struct AgentsApi {
    api: ApiClient,
    cache: AgentCache,
}

impl AgentsApi {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            cache: AgentCache::new(),
        }
    }

    pub fn cache(&self) -> &AgentCache {
        &self.cache
    }

    /// Fetch all agents and refresh the cache
    pub async fn list(&mut self) -> Result<&[Agent], PilotError> {
        let agents: Vec<Agent> = self.api.get_json("/agents").await?;
        tracing::debug!(count = agents.len(), "Fetched agents");
        self.cache.replace(agents);
        Ok(self.cache.agents())
    }

    pub async fn delete(&mut self, id: &str) -> Result<(), PilotError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(PilotError::invalid_request("Agent id cannot be empty"));
        }

        self.api.delete(&format!("/agents/{}", id)).await?;
        if self.cache.remove(id).is_none() {
            tracing::debug!(agent_id = id, "Deleted agent was not cached");
        }
        tracing::info!(agent_id = id, "Agent deleted");
        Ok(())
    }

    /// Ask the backend to build and run an agent from a prompt in one step
    pub async fn execute_prompt(&self, prompt: &str) -> Result<ActionCompletion, PilotError> {
        if prompt.trim().is_empty() {
            return Err(PilotError::invalid_request("Prompt cannot be empty."));
        }
        self.api
            .post_json(
                "/agents/execute",
                &ExecutePromptRequest {
                    prompt: prompt.to_string(),
                },
            )
            .await
    }

    pub async fn save(&mut self, request: &SaveAgentRequest) -> Result<Agent, PilotError> {
        if request.name.trim().is_empty() {
            return Err(PilotError::invalid_request("Agent name cannot be empty"));
        }
        if request.agent_code.trim().is_empty() {
            return Err(PilotError::invalid_request("Agent code cannot be empty"));
        }

        let agent: Agent = self.api.post_json("/agents", request).await?;
        tracing::info!(agent_id = %agent.id, name = %agent.name, "Agent saved");
        self.cache.upsert(agent.clone());
        Ok(agent)
    }
}
