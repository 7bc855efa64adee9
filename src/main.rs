use clap::Parser;
use metis_dispatch::agents::llm::create_provider;
use metis_dispatch::agents::{DispatchHandler, TurnRequest};
use metis_dispatch::cli::Cli;
use metis_dispatch::config::Settings;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let settings = Settings::new_with_cli(&cli)?;
    info!(
        agents = settings.agents.len(),
        tools = settings.tools.len(),
        "Starting dispatch with {} ({})",
        settings.llm.provider,
        settings.llm.model
    );

    let provider = create_provider(&settings.llm)?;
    let handler = DispatchHandler::from_settings(&settings, provider)?;

    let Some(prompt) = cli.prompt.clone() else {
        let agents: Vec<_> = handler
            .registry()
            .list_agents()
            .iter()
            .map(|a| json!({ "name": a.name, "description": a.description }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&json!({ "agents": agents }))?);
        return Ok(());
    };

    let session_id = cli
        .session_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    if cli.name_session {
        let name = handler.summarize_session_name(&prompt).await;
        println!("{}", serde_json::to_string_pretty(&json!({ "session_name": name }))?);
    }

    // Abandon the turn at the next state boundary on Ctrl-C
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling turn");
            on_signal.cancel();
        }
    });

    let request = TurnRequest {
        session_id: session_id.clone(),
        tenant_id: cli.tenant_id.clone(),
        user_id: cli.user_id.clone(),
        history: Vec::new(),
        user_prompt: prompt,
    };
    let (messages, debug_logs) = handler.get_response(request, cancel).await;
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({ "messages": messages, "debug_logs": debug_logs }))?
    );

    if cli.analytics {
        let events: Vec<_> = handler
            .monitor()
            .event_history()
            .into_iter()
            .filter(|e| e.session_id == session_id)
            .collect();
        let statistics = handler.monitor().get_overall_statistics();
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({ "events": events, "statistics": statistics }))?
        );
    }

    if cli.metrics {
        match handler.monitor().metrics() {
            Some(metrics) => print!("{}", metrics.encode()?),
            None => warn!("Prometheus metrics are disabled in the monitor settings"),
        }
    }

    Ok(())
}
