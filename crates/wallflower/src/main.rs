use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use wallconf::WallConfig;
use wallflower::{spawn_pipeline, web};

/// The Wallflower session mirror
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Config file (replaces ./wallflower.toml in the load order)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// State-event debounce window in milliseconds (overrides config)
    #[arg(long)]
    debounce_ms: Option<u64>,

    /// Sequence-gap threshold for fallback reloads (overrides config)
    #[arg(long)]
    gap_threshold: Option<u64>,

    /// Log level (overrides config)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = WallConfig::load_from(cli.config.as_deref())
        .context("failed to load configuration")?;
    if let Some(port) = cli.port {
        config.bind.http_port = port;
    }
    if let Some(debounce_ms) = cli.debounce_ms {
        config.engine.debounce_ms = debounce_ms;
    }
    if let Some(gap_threshold) = cli.gap_threshold {
        config.engine.gap_threshold = gap_threshold;
    }
    if let Some(log_level) = cli.log_level {
        config.telemetry.log_level = log_level;
    }

    wallflower::telemetry::init(&config.telemetry.log_level)?;

    let state = spawn_pipeline(&config);
    let router = web::router(state);

    let addr = format!("{}:{}", config.bind.host, config.bind.http_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(%addr, "wallflower listening");

    axum::serve(listener, router)
        .await
        .context("server error")?;
    Ok(())
}
