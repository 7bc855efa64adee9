//! Statically declared tool table
//!
//! Tools are named capabilities with a description, an argument schema and
//! an invoker. Which tools an agent may call is decided here, from the names
//! and tags on the agent definition.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::agents::config::ToolConfig;
use crate::agents::domain::{Agent, ToolDefinition};
use crate::agents::error::{DispatchError, DispatchResult};

/// Executes a tool call
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn invoke(&self, name: &str, args: Value) -> anyhow::Result<Value>;
}

/// Invoker backed by a synchronous closure
pub struct FnTool<F>(pub F);

#[async_trait]
impl<F> ToolInvoker for FnTool<F>
where
    F: Fn(Value) -> anyhow::Result<Value> + Send + Sync,
{
    async fn invoke(&self, _name: &str, args: Value) -> anyhow::Result<Value> {
        (self.0)(args)
    }
}

/// Invoker that always returns the same value
pub struct StaticTool(pub Value);

#[async_trait]
impl ToolInvoker for StaticTool {
    async fn invoke(&self, _name: &str, _args: Value) -> anyhow::Result<Value> {
        Ok(self.0.clone())
    }
}

/// Placeholder for a declared tool whose implementation was never bound
struct Unbound;

#[async_trait]
impl ToolInvoker for Unbound {
    async fn invoke(&self, name: &str, _args: Value) -> anyhow::Result<Value> {
        anyhow::bail!("tool '{}' has no implementation bound", name)
    }
}

/// One row of the tool table
#[derive(Clone)]
pub struct ToolSpec {
    pub definition: ToolDefinition,
    pub tags: Vec<String>,
    pub invoker: Arc<dyn ToolInvoker>,
}

impl ToolSpec {
    pub fn new(definition: ToolDefinition, invoker: Arc<dyn ToolInvoker>) -> Self {
        Self {
            definition,
            tags: Vec::new(),
            invoker,
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    /// Visible to `agent` by explicit binding or by a shared tag
    pub fn visible_to(&self, agent: &Agent) -> bool {
        agent.tools.iter().any(|t| t == self.name())
            || self.tags.iter().any(|tag| agent.tool_tags.contains(tag))
    }
}

impl std::fmt::Debug for ToolSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSpec")
            .field("name", &self.definition.name)
            .field("tags", &self.tags)
            .finish()
    }
}

/// Name-indexed table of every tool known to the process
#[derive(Debug, Clone, Default)]
pub struct ToolTable {
    tools: Vec<ToolSpec>,
    index: HashMap<String, usize>,
}

impl ToolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from declarations; entries without a static response stay unbound
    pub fn from_configs(configs: &[ToolConfig]) -> DispatchResult<Self> {
        let mut table = Self::new();
        for config in configs {
            let invoker: Arc<dyn ToolInvoker> = match &config.static_response {
                Some(value) => Arc::new(StaticTool(value.clone())),
                None => Arc::new(Unbound),
            };
            let definition = ToolDefinition::new(&config.name, &config.description, config.parameters.clone());
            table.register(ToolSpec::new(definition, invoker).with_tags(config.tags.iter().cloned()))?;
        }
        Ok(table)
    }

    /// Add a tool; names must be unique
    pub fn register(&mut self, spec: ToolSpec) -> DispatchResult<()> {
        if spec.name().is_empty() {
            return Err(DispatchError::Registry("tool name must not be empty".to_string()));
        }
        if self.index.contains_key(spec.name()) {
            return Err(DispatchError::Registry(format!(
                "duplicate tool name '{}'",
                spec.name()
            )));
        }
        self.index.insert(spec.name().to_string(), self.tools.len());
        self.tools.push(spec);
        Ok(())
    }

    /// Chainable [`register`](Self::register)
    pub fn with(mut self, spec: ToolSpec) -> DispatchResult<Self> {
        self.register(spec)?;
        Ok(self)
    }

    /// Replace the invoker of a declared tool
    pub fn bind(&mut self, name: &str, invoker: Arc<dyn ToolInvoker>) -> DispatchResult<()> {
        let &i = self
            .index
            .get(name)
            .ok_or_else(|| DispatchError::Registry(format!("cannot bind undeclared tool '{}'", name)))?;
        self.tools[i].invoker = invoker;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.iter().map(|t| t.name())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Definitions offered to `agent`, in table order
    pub fn definitions_for(&self, agent: &Agent) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .filter(|t| t.visible_to(agent))
            .map(|t| t.definition.clone())
            .collect()
    }

    pub fn is_visible(&self, agent: &Agent, name: &str) -> bool {
        self.get(name).is_some_and(|t| t.visible_to(agent))
    }

    /// Run a tool by name
    pub async fn invoke(&self, name: &str, args: Value) -> DispatchResult<Value> {
        let spec = self.get(name).ok_or_else(|| DispatchError::ToolExecution {
            tool: name.to_string(),
            message: "tool is not registered".to_string(),
        })?;
        spec.invoker
            .invoke(name, args)
            .await
            .map_err(|e| DispatchError::ToolExecution {
                tool: name.to_string(),
                message: e.to_string(),
            })
    }
}
