mod agent_modules;

use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use agent_modules::client::CoordinatorClient;
use agent_modules::config::AgentConfig;
use agent_modules::heartbeat::heartbeat_loop;
use agent_modules::scheduler::CheckScheduler;
use agent_modules::updates::{self, POLL_INTERVAL};

#[derive(Parser, Debug)]
#[command(author, version, about = "Storm probing agent", long_about = None)]
struct Args {
    /// Load environment variables from this file instead of `.env`.
    #[arg(long)]
    env_file: Option<String>,
}

fn init_logging() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stdout))
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();
    init_logging();
    match &args.env_file {
        Some(path) => {
            dotenv::from_filename(path).ok();
        }
        None => {
            dotenv::dotenv().ok();
        }
    }

    let config = match AgentConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load agent configuration: {}", e);
            return Err(e.into());
        }
    };
    info!(
        name = %config.name,
        location = %config.location,
        server = %config.server_url,
        check_interval = ?config.check_interval_ms,
        "Starting Storm agent."
    );

    let client = Arc::new(CoordinatorClient::new(&config)?);

    // Register and fetch targets; both fail fatally after exhausted retries.
    client.register().await?;
    let (targets, mut last_version) = client.fetch_targets().await?;
    info!(count = targets.len(), version = last_version, "Fetched target list.");

    let mut scheduler = CheckScheduler::new();
    scheduler.start_all(&targets, &client, &config.name);

    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let heartbeat = tokio::spawn(heartbeat_loop(client.clone(), shutdown_rx));

    let mut poll = tokio::time::interval(POLL_INTERVAL);
    poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    poll.tick().await; // the immediate first tick; we just fetched

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => break,

            _ = poll.tick() => {
                updates::poll_once(&client, &mut scheduler, &config.name, &mut last_version).await;
            }
        }
    }

    info!("Shutting down: stopping schedulers, dropping in-flight checks.");
    scheduler.stop_all();
    let _ = shutdown_tx.send(());
    let _ = heartbeat.await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => error!(error = %e, "Failed to install SIGTERM handler."),
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received.");
}
