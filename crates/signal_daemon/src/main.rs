mod routes;
mod state;

use anyhow::{Context, Result};
use clap::Parser;
use signal_core::PipelineConfig;
use signal_runtime::{apply_overrides, load_config, parse_overrides};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crate::routes::make_router_with_cors;
use crate::state::AppState;

#[derive(Parser)]
#[command(name = "signal_daemon", about = "Traffic-light display pipeline daemon")]
struct Cli {
    #[arg(long, default_value = "127.0.0.1:3002")]
    bind: String,
    /// Pipeline config JSON. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Override a config key, e.g. `--set expire_window_ms=5000`. Repeatable.
    #[arg(long = "set", value_name = "KEY=VALUE")]
    overrides: Vec<String>,
    #[arg(long, default_value = "http://localhost:5173")]
    cors_origin: String,
    /// Leave the pipeline stopped until `POST /api/v1/start`.
    #[arg(long)]
    no_autostart: bool,
}

fn resolve_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => PipelineConfig::default(),
    };
    let overrides = parse_overrides(&cli.overrides)?;
    apply_overrides(&mut config, &overrides)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = resolve_config(&cli)?;
    tracing::info!(
        channel = %config.channel,
        heartbeat_interval_ms = config.heartbeat_interval_ms,
        expire_window_ms = config.expire_window_ms,
        "loaded pipeline config"
    );

    let state = AppState::new(config);
    if !cli.no_autostart {
        state.pipeline.start().context("starting pipeline")?;
    }

    let app = make_router_with_cors(state.clone(), &cli.cors_origin)
        .with_context(|| format!("invalid CORS origin: {}", cli.cors_origin))?;
    let listener = tokio::net::TcpListener::bind(&cli.bind)
        .await
        .with_context(|| format!("binding {}", cli.bind))?;
    tracing::info!("listening on http://{}", cli.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("serving http")?;

    state.pipeline.stop();
    Ok(())
}
