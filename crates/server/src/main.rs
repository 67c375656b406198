use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use dotenv::dotenv;
use tracing::{error, info};
use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use storm_server::alerting::AlertSink;
use storm_server::config::ServerConfig;
use storm_server::monitor::MonitorEngine;
use storm_server::registry::AgentRegistry;
use storm_server::targets::TargetConfigManager;
use storm_server::web::{create_router, AppState};

#[derive(Parser, Debug)]
#[command(author, version, about = "Storm coordinator", long_about = None)]
struct Args {
    /// Log only to stdout, skipping the rolling file appender.
    #[arg(long)]
    no_log_file: bool,
}

fn init_logging(with_file: bool) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=warn"));
    if with_file {
        let stdout_layer = fmt::layer().with_writer(std::io::stdout);
        let file_appender = rolling::daily("logs", "storm-server.log");
        let file_layer = fmt::layer().with_writer(file_appender).with_ansi(false).json();
        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .with(stdout_layer)
            .init();
    } else {
        let stdout_layer = fmt::layer().with_writer(std::io::stdout);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stdout_layer)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();
    init_logging(!args.no_log_file);
    dotenv().ok();

    let config = match ServerConfig::load() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            error!("Failed to load server configuration: {}", e);
            return Err(e.into());
        }
    };
    info!(port = config.port, data_dir = %config.data_dir.display(), "Starting Storm coordinator.");

    let targets = Arc::new(TargetConfigManager::load(config.targets_path())?);
    let registry = Arc::new(AgentRegistry::load(config.agents_path())?);
    let alerts = Arc::new(AlertSink::new(config.webhook_url.clone()));
    let monitor = Arc::new(MonitorEngine::load(
        config.results_path(),
        targets.clone(),
        alerts,
    )?);

    // Startup prune, then daily.
    monitor.prune(config.retention_days);
    tokio::spawn(monitor.clone().run_prune(config.retention_days));
    tokio::spawn(registry.clone().run_sweep());
    tokio::spawn(targets.clone().watch());

    let state = Arc::new(AppState {
        config: config.clone(),
        targets,
        registry,
        monitor: monitor.clone(),
        server_id: Uuid::new_v4().to_string(),
        started_at: Instant::now(),
    });
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, "HTTP server listening.");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Flush the results store before exiting.
    if let Err(e) = monitor.flush() {
        error!(error = %e, "Failed to flush results store on shutdown.");
    }
    info!("Coordinator shut down.");
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
