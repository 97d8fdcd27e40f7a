//! Dune - Interactive Terminal Entry Point
//!
//! Reads requests from stdin and runs them through the agent loop.

use std::sync::Arc;

use dune::agent::{Agent, Session, TurnCanceller};
use dune::config::Config;
use dune::console::ConsoleUi;
use dune::llm::OpenAiCompatClient;
use dune::tools::ToolRegistry;
use tokio::sync::Notify;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they never interleave with the conversation.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dune=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::from_env()?;
    info!(
        model = %config.default_model,
        workspace = %config.workspace_path.display(),
        "Loaded configuration"
    );

    let registry = Arc::new(ToolRegistry::with_builtin_tools(&config.workspace_path)?);
    let client = Arc::new(OpenAiCompatClient::new(&config.base_url, &config.api_key));
    let ui = Arc::new(ConsoleUi::new());
    ui.print_banner(&config.default_model, config.auto_approve, &config.exit_command);

    let mut session = Session::new(config.approval_mode());
    let agent = Agent::new(config, client, registry, ui);
    let canceller = TurnCanceller::new();

    // Ctrl-C cancels the turn in flight, or ends the session when idle.
    let quit = Arc::new(Notify::new());
    {
        let canceller = canceller.clone();
        let quit = Arc::clone(&quit);
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if !canceller.cancel() {
                    quit.notify_one();
                }
            }
        });
    }

    tokio::select! {
        result = agent.run(&mut session, &canceller) => result?,
        _ = quit.notified() => println!(),
    }

    println!("Session ended.");
    Ok(())
}
