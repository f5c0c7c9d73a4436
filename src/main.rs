use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use converse::bootstrap::{self, Runtime};
use converse::channels::repl;
use converse::channels::telegram::TelegramRelay;
use converse::channels::web::{ApiState, start_server};
use converse::config::Config;

#[derive(Parser)]
#[command(name = "converse", version, about = "Conversational Stellar wallet assistant")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API (and the Telegram relay when configured).
    Serve,
    /// Interactive local session against the router.
    Repl {
        /// Session id to converse under.
        #[arg(long, default_value = "repl")]
        session_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    bootstrap::init_tracing();

    let config = Config::load().context("failed to load configuration")?;
    let runtime = bootstrap::build_runtime(&config).context("failed to build runtime")?;

    match Cli::parse().command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, runtime).await,
        Command::Repl { session_id } => {
            repl::run(
                Arc::clone(&runtime.router),
                Arc::clone(&runtime.sessions),
                &session_id,
            )
            .await?;
            Ok(())
        }
    }
}

async fn serve(config: Config, runtime: Runtime) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.http.host, config.http.port)
        .parse()
        .with_context(|| {
            format!(
                "invalid bind address {}:{}",
                config.http.host, config.http.port
            )
        })?;

    let state = Arc::new(ApiState {
        router: Arc::clone(&runtime.router),
        sessions: Arc::clone(&runtime.sessions),
    });
    let (_bound, shutdown_tx) = start_server(addr, state).await?;

    let mut telegram_task = None;
    if let Some(telegram_config) = &config.telegram {
        let relay = TelegramRelay::new(telegram_config, Arc::clone(&runtime.router))?;
        telegram_task = Some(tokio::spawn(relay.run()));
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("shutting down");

    if let Some(task) = telegram_task {
        task.abort();
    }
    let _ = shutdown_tx.send(());
    Ok(())
}
