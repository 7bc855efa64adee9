use config::{Config, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub mod validator;

pub use validator::{ConfigValidator, ValidationError};

use crate::agents::config::{AgentConfig, LlmProviderConfig, MonitorConfig, OrchestrationConfig, ToolConfig};
use crate::cli::Cli;

/// Everything needed to build a dispatch engine
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub llm: LlmProviderConfig,
    #[serde(default)]
    pub orchestration: OrchestrationConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
    /// Statically declared tool table
    #[serde(default)]
    pub tools: Vec<ToolConfig>,
}

impl Settings {
    pub fn new() -> Result<Self, anyhow::Error> {
        Self::from_root(".")
    }

    /// Create settings from CLI arguments (includes config file and CLI overrides)
    pub fn new_with_cli(cli: &Cli) -> Result<Self, anyhow::Error> {
        let mut settings = Self::load(&cli.root)?;

        // CLI > env vars > config file
        settings.apply_cli_overrides(cli);

        settings.validate()?;
        Ok(settings)
    }

    pub fn from_root(root: impl AsRef<Path>) -> Result<Self, anyhow::Error> {
        let settings = Self::load(root.as_ref())?;
        settings.validate()?;
        Ok(settings)
    }

    fn load(root: &Path) -> Result<Self, anyhow::Error> {
        let s = Config::builder()
            .add_source(File::from(root.join("dispatch")).required(false))
            .build()?;

        let mut settings: Settings = s.try_deserialize()?;
        settings.load_agents_from_dir(&root.join("config").join("agents"))?;
        settings.resolve_instructions(root)?;

        tracing::debug!(
            agents = settings.agents.len(),
            tools = settings.tools.len(),
            "Loaded settings from {}",
            root.display()
        );
        Ok(settings)
    }

    /// Apply CLI argument overrides to settings
    fn apply_cli_overrides(&mut self, cli: &Cli) {
        if let Some(provider) = cli.provider {
            self.llm.provider = provider;
        }
        if let Some(model) = &cli.model {
            self.llm.model = model.clone();
        }
        if let Some(base_url) = &cli.base_url {
            self.llm.base_url = Some(base_url.clone());
        }
        if let Some(max_iterations) = cli.max_iterations {
            self.orchestration.max_iterations = max_iterations;
        }
        if let Some(default_agent) = &cli.default_agent {
            self.orchestration.default_agent = default_agent.clone();
        }
    }

    fn validate(&self) -> Result<(), anyhow::Error> {
        ConfigValidator::validate(self).map_err(|errors| {
            let error_messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            anyhow::anyhow!("Configuration validation failed:\n{}", error_messages.join("\n"))
        })
    }

    /// Merge another Settings into this one.
    ///
    /// `other` wins for scalar sections; agents and tools are merged by name.
    pub fn merge(&mut self, other: Settings) {
        self.llm = other.llm;
        self.orchestration = other.orchestration;
        self.monitor = other.monitor;
        Self::merge_vec_by_key(&mut self.agents, other.agents, |a| a.name.clone());
        Self::merge_vec_by_key(&mut self.tools, other.tools, |t| t.name.clone());
    }

    /// Items from `other` replace items in `base` with the same key, in place;
    /// new items are appended.
    fn merge_vec_by_key<T, K, F>(base: &mut Vec<T>, other: Vec<T>, key_fn: F)
    where
        K: Eq,
        F: Fn(&T) -> K,
    {
        for item in other {
            let key = key_fn(&item);
            match base.iter_mut().find(|existing| key_fn(existing) == key) {
                Some(existing) => *existing = item,
                None => base.push(item),
            }
        }
    }

    fn load_agents_from_dir(&mut self, path: &Path) -> Result<(), anyhow::Error> {
        let pattern = format!("{}/*", path.display());
        let mut loaded = Vec::new();
        for entry in glob::glob(&pattern)? {
            match entry {
                Ok(path) => {
                    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
                        if matches!(ext, "json" | "yaml" | "yml" | "toml") {
                            let content = std::fs::read_to_string(&path)?;
                            let agent: AgentConfig = match ext {
                                "json" => serde_json::from_str(&content)?,
                                "toml" => toml::from_str(&content)?,
                                _ => serde_yaml::from_str(&content)?,
                            };
                            tracing::debug!(agent = %agent.name, "Loaded agent from {}", path.display());
                            loaded.push(agent);
                        }
                    }
                }
                Err(e) => tracing::warn!("Failed to read glob entry: {}", e),
            }
        }
        Self::merge_vec_by_key(&mut self.agents, loaded, |a| a.name.clone());
        Ok(())
    }

    /// Inline every `instructions_file`, relative to the configuration root
    fn resolve_instructions(&mut self, root: &Path) -> Result<(), anyhow::Error> {
        for agent in &mut self.agents {
            if agent.instructions.is_some() {
                continue;
            }
            if let Some(file) = &agent.instructions_file {
                let path = root.join(file);
                let text = std::fs::read_to_string(&path).map_err(|e| {
                    anyhow::anyhow!(
                        "Failed to read instructions for agent '{}' from {}: {}",
                        agent.name,
                        path.display(),
                        e
                    )
                })?;
                agent.instructions = Some(text.trim().to_string());
            }
        }
        Ok(())
    }
}
