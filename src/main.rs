use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use request_telemetry::{server, AppState, Config, Telemetry};

#[derive(Parser)]
#[command(name = "request-telemetry", about = "Request telemetry host server")]
struct Cli {
    /// TOML config file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override `server.bind`.
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,request_telemetry=debug".into()),
        )
        .init();

    let cli = Cli::parse();

    // ── 1. Configuration ─────────────────────────────────────────
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }

    // ── 2. Restore telemetry (fatal on a bad snapshot) ───────────
    let telemetry = Arc::new(
        Telemetry::init(&config.telemetry).context("cannot start telemetry from snapshot")?,
    );

    // ── 3. Build shared state & router ───────────────────────────
    let state = Arc::new(AppState {
        telemetry: telemetry.clone(),
        stream_interval: Duration::from_millis(config.server.stream_interval_ms),
    });
    let app = server::create_router(state);

    // ── 4. Bind & serve ──────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;
    info!(
        bind = %config.server.bind,
        "serving: / /health /metrics /api/metrics /api/metrics/stream"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server exited with error")?;

    // ── 5. Final flush ───────────────────────────────────────────
    if let Err(e) = telemetry.shutdown(true) {
        error!(error = %e, "final snapshot failed, restart resumes from the previous one");
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
