use clap::Parser;
use std::path::PathBuf;

use crate::agents::config::LlmProviderType;

/// Multi-agent dispatch - route one user turn through a team of agents
#[derive(Parser, Debug, Clone)]
#[command(name = "metis-dispatch", version, about, long_about = None)]
pub struct Cli {
    /// Directory holding `dispatch.{toml,yaml,json}` and `config/agents/`
    #[arg(short, long, env = "DISPATCH_ROOT", default_value = ".")]
    pub root: PathBuf,

    /// The user prompt to dispatch
    pub prompt: Option<String>,

    /// Completion provider
    #[arg(long, env = "DISPATCH_PROVIDER", value_parser = parse_provider)]
    pub provider: Option<LlmProviderType>,

    /// Model, or deployment name for Azure
    #[arg(long, env = "DISPATCH_MODEL")]
    pub model: Option<String>,

    /// Completion service base URL
    #[arg(long, env = "DISPATCH_BASE_URL")]
    pub base_url: Option<String>,

    /// Hard ceiling on agent turns per user turn
    #[arg(long, env = "DISPATCH_MAX_ITERATIONS")]
    pub max_iterations: Option<u32>,

    /// Agent used when selection cannot decide
    #[arg(long, env = "DISPATCH_DEFAULT_AGENT")]
    pub default_agent: Option<String>,

    #[arg(long, env = "DISPATCH_SESSION_ID")]
    pub session_id: Option<String>,

    #[arg(long, env = "DISPATCH_TENANT_ID", default_value = "default")]
    pub tenant_id: String,

    #[arg(long, env = "DISPATCH_USER_ID", default_value = "cli")]
    pub user_id: String,

    /// Print Prometheus metrics after the turn
    #[arg(long)]
    pub metrics: bool,

    /// Print the session analytics after the turn
    #[arg(long)]
    pub analytics: bool,

    /// Print a two-word session name for the prompt
    #[arg(long)]
    pub name_session: bool,
}

fn parse_provider(value: &str) -> Result<LlmProviderType, String> {
    match value.to_ascii_lowercase().as_str() {
        "openai" => Ok(LlmProviderType::OpenAI),
        "azure" | "azureopenai" => Ok(LlmProviderType::AzureOpenAI),
        other => Err(format!("unknown provider '{}', expected openai or azure", other)),
    }
}

impl Cli {
    /// Check if any settings override is provided via CLI or environment
    pub fn has_overrides(&self) -> bool {
        self.provider.is_some()
            || self.model.is_some()
            || self.base_url.is_some()
            || self.max_iterations.is_some()
            || self.default_agent.is_some()
    }
}
