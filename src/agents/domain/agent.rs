//! Agent domain types

use serde::{Deserialize, Serialize};

use crate::agents::config::AgentConfig;

/// An immutable, instruction-bound agent definition
///
/// Built once at process start and shared read-only across sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    /// Unique name, also the literal token the selector must return
    pub name: String,
    /// Used in logs and in the selector prompt
    pub description: String,
    /// System prompt text
    pub instructions: String,
    /// Names of tools bound to this agent
    #[serde(default)]
    pub tools: Vec<String>,
    /// Tags that make additional tools visible
    #[serde(default)]
    pub tool_tags: Vec<String>,
}

impl Agent {
    /// Create an agent with no tool bindings
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        instructions: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            instructions: instructions.into(),
            tools: Vec::new(),
            tool_tags: Vec::new(),
        }
    }

    /// Bind tools by name
    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }

    /// Make tools carrying any of these tags visible
    pub fn with_tool_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tool_tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

impl From<&AgentConfig> for Agent {
    fn from(config: &AgentConfig) -> Self {
        Self {
            name: config.name.clone(),
            description: config.description.clone(),
            instructions: config.instructions.clone().unwrap_or_default(),
            tools: config.tools.clone(),
            tool_tags: config.tool_tags.clone(),
        }
    }
}
