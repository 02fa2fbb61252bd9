use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use oneclick_core::config::{LogFormat, LoggingConfig, OneclickConfig};
use oneclick_scheduler::{HttpExecutor, Scheduler, SqliteStore};
use tracing::info;
use tracing_subscriber::{fmt::writer::BoxMakeWriter, EnvFilter};

mod app;
mod http;

const DEFAULT_LOG_FILTER: &str = "oneclick_gateway=info,oneclick_scheduler=info,tower_http=info";

/// Deferred employee provisioning: schedules jobs and submits them to the
/// provisioning workflow when they come due.
#[derive(Debug, Parser)]
#[command(name = "oneclick-gateway", version)]
struct Cli {
    /// Path to the TOML config file. Falls back to `ONECLICK_CONFIG`, then
    /// `./oneclick.toml`.
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // config: --config > ONECLICK_CONFIG > ./oneclick.toml
    let config_path = cli
        .config
        .or_else(|| std::env::var("ONECLICK_CONFIG").ok());
    let config = OneclickConfig::load(config_path.as_deref())?;
    init_tracing(&config.logging)?;

    let db_path = config.database.path.clone();
    ensure_parent_dir(&db_path);
    info!(path = %db_path, "opening SQLite database");
    let store = Arc::new(SqliteStore::open(&db_path)?);

    let executor = Arc::new(HttpExecutor::from_config(&config.provisioning)?);
    info!(
        api_url = %config.provisioning.api_url,
        timeout_secs = config.provisioning.timeout_secs,
        "provisioning endpoint configured"
    );

    let scheduler = Arc::new(Scheduler::from_config(store, executor, &config.scheduler));

    // spawn the polling loop; it drains its workers once told to stop
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let engine = tokio::spawn(scheduler.clone().run(shutdown_rx));

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let state = Arc::new(app::AppState::new(config, scheduler));
    let router = app::build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("OneClick gateway listening on {}", addr);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // signal scheduler to stop and wait for it to drain
    let _ = shutdown_tx.send(true);
    engine.await?;
    info!("gateway stopped");
    Ok(())
}

/// Install the global subscriber described by the `[logging]` section.
///
/// `RUST_LOG` takes precedence over `logging.level`.
fn init_tracing(cfg: &LoggingConfig) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(cfg.level.as_deref().unwrap_or(DEFAULT_LOG_FILTER))?,
    };

    let (writer, ansi) = match cfg.output.as_deref() {
        None | Some("stdout") => (BoxMakeWriter::new(std::io::stdout), true),
        Some(path) => {
            ensure_parent_dir(path);
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            (BoxMakeWriter::new(std::sync::Mutex::new(file)), false)
        }
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(ansi);
    match cfg.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
    Ok(())
}

/// Resolve on SIGINT, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
