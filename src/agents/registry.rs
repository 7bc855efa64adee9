//! Immutable registry of agent definitions

use std::collections::HashMap;
use std::sync::Arc;

use crate::agents::domain::Agent;
use crate::agents::error::{DispatchError, DispatchResult};

/// Characters that would break the transcript header the selector echoes
const FORBIDDEN_NAME_CHARS: &[char] = &['<', '>', '|', '/'];

/// Check that `name` is usable as a selector token
pub fn validate_agent_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("agent name must not be empty".to_string());
    }
    if let Some(c) = name
        .chars()
        .find(|c| c.is_whitespace() || FORBIDDEN_NAME_CHARS.contains(c))
    {
        return Err(format!("agent name '{}' contains forbidden character {:?}", name, c));
    }
    Ok(())
}

/// Static set of agents, shared read-only across all sessions
#[derive(Debug, Clone)]
pub struct AgentRegistry {
    agents: Vec<Arc<Agent>>,
    /// Lowercased name -> position in `agents`
    index: HashMap<String, usize>,
}

impl AgentRegistry {
    /// Build a registry, rejecting empty, duplicate or malformed registrations
    pub fn new(agents: impl IntoIterator<Item = Agent>) -> DispatchResult<Self> {
        let mut registry = Self {
            agents: Vec::new(),
            index: HashMap::new(),
        };

        for agent in agents {
            validate_agent_name(&agent.name).map_err(DispatchError::Registry)?;
            let key = agent.name.to_lowercase();
            if registry.index.contains_key(&key) {
                return Err(DispatchError::Registry(format!(
                    "duplicate agent name '{}'",
                    agent.name
                )));
            }
            registry.index.insert(key, registry.agents.len());
            registry.agents.push(Arc::new(agent));
        }

        if registry.agents.is_empty() {
            return Err(DispatchError::Registry(
                "at least one agent must be registered".to_string(),
            ));
        }

        Ok(registry)
    }

    /// Agents in registration order
    pub fn list_agents(&self) -> &[Arc<Agent>] {
        &self.agents
    }

    /// Look up an agent by its exact name
    pub fn get_agent(&self, name: &str) -> DispatchResult<Arc<Agent>> {
        self.agents
            .iter()
            .find(|a| a.name == name)
            .cloned()
            .ok_or_else(|| DispatchError::AgentNotFound(name.to_string()))
    }

    /// Map a selector answer onto a registered agent
    ///
    /// Matching ignores case and surrounding whitespace; anything else is an
    /// unknown agent.
    pub fn resolve_selection(&self, selected: &str) -> DispatchResult<Arc<Agent>> {
        self.index
            .get(&selected.trim().to_lowercase())
            .map(|&i| self.agents[i].clone())
            .ok_or_else(|| DispatchError::UnknownAgentSelected(selected.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.agents.iter().any(|a| a.name == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.agents.iter().map(|a| a.name.clone()).collect()
    }

    /// `- Name: description` lines for the selector prompt
    pub fn participants(&self) -> String {
        self.agents
            .iter()
            .map(|a| format!("- {}: {}", a.name, a.description))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
