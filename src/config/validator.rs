use std::collections::{HashMap, HashSet};
use thiserror::Error;

use crate::agents::config::{AgentConfig, MonitorConfig, OrchestrationConfig, ToolConfig};
use crate::agents::registry::validate_agent_name;
use crate::config::Settings;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Cross-reference error: {0}")]
    CrossReference(String),

    #[error("Duplicate entry: {0}")]
    Duplicate(String),
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.into(),
        reason: reason.into(),
    }
}

/// Collects every configuration problem instead of stopping at the first
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(settings: &Settings) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        errors.extend(Self::validate_agents(&settings.agents));
        errors.extend(Self::validate_tools(&settings.tools));
        errors.extend(Self::validate_orchestration(&settings.orchestration));
        errors.extend(Self::validate_monitor(&settings.monitor));
        errors.extend(Self::validate_cross_references(settings));

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_agents(agents: &[AgentConfig]) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if agents.is_empty() {
            errors.push(ValidationError::MissingField("agents".to_string()));
        }

        // Selector answers are matched without case, so names must differ by more than case
        let mut seen_names = HashMap::new();
        for (idx, agent) in agents.iter().enumerate() {
            if let Some(prev_idx) = seen_names.insert(agent.name.to_lowercase(), idx) {
                errors.push(ValidationError::Duplicate(format!(
                    "Agent name '{}' appears at indices {} and {}",
                    agent.name, prev_idx, idx
                )));
            }

            if agent.name.is_empty() {
                errors.push(ValidationError::MissingField(format!("agents[{}].name", idx)));
            } else if let Err(reason) = validate_agent_name(&agent.name) {
                errors.push(invalid(format!("agents[{}].name", idx), reason));
            }

            if agent.description.is_empty() {
                errors.push(ValidationError::MissingField(format!("agents[{}].description", idx)));
            }

            if agent.instructions.is_none() && agent.instructions_file.is_none() {
                errors.push(ValidationError::MissingField(format!(
                    "agents[{}].instructions or agents[{}].instructions_file",
                    idx, idx
                )));
            }
        }
        errors
    }

    fn validate_tools(tools: &[ToolConfig]) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut seen_names = HashMap::new();

        for (idx, tool) in tools.iter().enumerate() {
            if let Some(prev_idx) = seen_names.insert(&tool.name, idx) {
                errors.push(ValidationError::Duplicate(format!(
                    "Tool name '{}' appears at indices {} and {}",
                    tool.name, prev_idx, idx
                )));
            }

            if tool.name.is_empty() {
                errors.push(ValidationError::MissingField(format!("tools[{}].name", idx)));
            }

            if tool.description.is_empty() {
                errors.push(ValidationError::MissingField(format!("tools[{}].description", idx)));
            }

            if !tool.parameters.is_object() {
                errors.push(invalid(
                    format!("tools[{}].parameters", idx),
                    "must be a JSON Schema object",
                ));
            }
        }
        errors
    }

    fn validate_orchestration(config: &OrchestrationConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if config.max_iterations == 0 {
            errors.push(invalid("orchestration.max_iterations", "must be at least 1"));
        }
        if config.default_agent.is_empty() {
            errors.push(ValidationError::MissingField("orchestration.default_agent".to_string()));
        }
        if config.selection_window == Some(0) {
            errors.push(invalid("orchestration.selection_window", "must be at least 1 when set"));
        }
        if config.termination_window == 0 {
            errors.push(invalid("orchestration.termination_window", "must be at least 1"));
        }
        if config.max_context_chars == 0 {
            errors.push(invalid("orchestration.max_context_chars", "must be at least 1"));
        }
        if config.decision_timeout_seconds == 0 {
            errors.push(invalid("orchestration.decision_timeout_seconds", "must be at least 1"));
        }
        if config.retry.max_attempts == 0 {
            errors.push(invalid("orchestration.retry.max_attempts", "must be at least 1"));
        }
        if config.retry.initial_interval_ms > config.retry.max_interval_ms {
            errors.push(invalid(
                "orchestration.retry.initial_interval_ms",
                "must not exceed max_interval_ms",
            ));
        }
        errors
    }

    fn validate_monitor(config: &MonitorConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if config.event_capacity == 0 {
            errors.push(invalid("monitor.event_capacity", "must be at least 1"));
        }
        errors
    }

    fn validate_cross_references(settings: &Settings) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        let default_agent = &settings.orchestration.default_agent;
        if !default_agent.is_empty()
            && !settings.agents.iter().any(|a| &a.name == default_agent)
        {
            errors.push(ValidationError::CrossReference(format!(
                "Default agent '{}' is not a registered agent",
                default_agent
            )));
        }

        let tool_names: HashSet<&str> = settings.tools.iter().map(|t| t.name.as_str()).collect();
        for agent in &settings.agents {
            for tool in &agent.tools {
                if !tool_names.contains(tool.as_str()) {
                    errors.push(ValidationError::CrossReference(format!(
                        "Agent '{}' references unknown tool '{}'",
                        agent.name, tool
                    )));
                }
            }
        }
        errors
    }
}
