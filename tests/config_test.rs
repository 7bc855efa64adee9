use metis_dispatch::agents::config::LlmProviderType;
use metis_dispatch::agents::llm::{ScriptKind, ScriptedProvider};
use metis_dispatch::agents::orchestration::keys;
use metis_dispatch::agents::{DispatchHandler, ToolCall, TurnRequest};
use metis_dispatch::config::Settings;
use serde_json::json;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const DISPATCH_YAML: &str = r#"
llm:
  provider: azure
  model: gpt-4o
  base_url: https://bank.openai.azure.com
orchestration:
  max_iterations: 5
  selection_window: 6
tools:
  - name: get_balance
    description: Current balance of an account
    parameters:
      type: object
      properties:
        account_id:
          type: string
    tags: [banking]
    static_response:
      balance: 1250
      currency: USD
"#;

fn write_deployment(root: &std::path::Path) -> anyhow::Result<()> {
    fs::create_dir_all(root.join("config/agents"))?;
    fs::create_dir_all(root.join("prompts"))?;
    fs::write(root.join("dispatch.yaml"), DISPATCH_YAML)?;

    fs::write(
        root.join("config/agents/coordinator.toml"),
        r#"
name = "Coordinator"
description = "Greets the user and routes requests"
instructions = "You coordinate."
"#,
    )?;
    fs::write(
        root.join("config/agents/transactions.yaml"),
        r#"
name: Transactions
description: Balances, transfers and payments
instructions_file: prompts/transactions.txt
tool_tags: [banking]
"#,
    )?;
    fs::write(root.join("prompts/transactions.txt"), "You move money carefully.\n")?;
    Ok(())
}

#[test]
fn test_load_deployment_from_root() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    write_deployment(temp_dir.path())?;

    let settings = Settings::from_root(temp_dir.path())?;

    assert_eq!(settings.llm.provider, LlmProviderType::AzureOpenAI);
    assert_eq!(settings.llm.model, "gpt-4o");
    assert_eq!(settings.orchestration.max_iterations, 5);
    assert_eq!(settings.orchestration.selection_window, Some(6));
    assert_eq!(settings.orchestration.default_agent, "Coordinator");
    assert_eq!(settings.monitor.event_capacity, 1000);
    assert_eq!(settings.agents.len(), 2);
    assert_eq!(settings.tools.len(), 1);

    let transactions = settings
        .agents
        .iter()
        .find(|a| a.name == "Transactions")
        .expect("Transactions agent should be loaded");
    assert_eq!(transactions.instructions.as_deref(), Some("You move money carefully."));
    Ok(())
}

#[test]
fn test_invalid_deployment_reports_every_problem() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    fs::write(
        temp_dir.path().join("dispatch.toml"),
        r#"
[orchestration]
max_iterations = 0
default_agent = "Ghost"

[[agents]]
name = "Customer Support"
description = "Complaints"
instructions = "You support."
tools = ["open_ticket"]
"#,
    )?;

    let err = Settings::from_root(temp_dir.path()).unwrap_err().to_string();

    assert!(err.contains("orchestration.max_iterations"), "{}", err);
    assert!(err.contains("Ghost"), "{}", err);
    assert!(err.contains("Customer Support"), "{}", err);
    assert!(err.contains("open_ticket"), "{}", err);
    Ok(())
}

#[tokio::test]
async fn test_settings_drive_a_turn_with_a_static_tool() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    write_deployment(temp_dir.path())?;
    let settings = Settings::from_root(temp_dir.path())?;

    let provider = Arc::new(
        ScriptedProvider::new()
            .select("Transactions", "balance question")
            .call_tools(vec![ToolCall::new("call_1", "get_balance", json!({"account_id": "42"}))])
            .reply("Your balance is 1250 USD.")
            .keep_going(false, "answered"),
    );
    let handler = DispatchHandler::from_settings(&settings, provider.clone())?;

    let request = TurnRequest {
        session_id: "s-1".to_string(),
        tenant_id: "bank".to_string(),
        user_id: "bob".to_string(),
        history: Vec::new(),
        user_prompt: "What's my balance?".to_string(),
    };
    let (messages, logs) = handler.get_response(request, CancellationToken::new()).await;

    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].author_name, "Transactions");
    let tool_log = logs[0].values(keys::TOOL_CALL).next().unwrap_or_default();
    assert!(tool_log.contains("-> ok"), "{}", tool_log);

    // The tool result went back to the model on the second round
    let agent_calls = provider.requests_of(ScriptKind::Agent);
    assert_eq!(agent_calls.len(), 2);
    assert!(agent_calls[1].messages.iter().any(|m| m.content.contains("1250")));

    let metrics = handler.monitor().metrics().expect("metrics are enabled by default").encode()?;
    assert!(metrics.contains("dispatch_tool_calls_total"));
    Ok(())
}
