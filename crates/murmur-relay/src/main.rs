//! murmur — the session-group notification relay.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use murmur_broker::{Broker, RedisBroker};
use murmur_server::config::RelayConfig;
use murmur_server::metrics;
use murmur_server::server::RelayServer;
use murmur_transcribe::{SidecarEngine, TranscriptionEngine};

/// Real-time websocket notification relay.
#[derive(Parser, Debug)]
#[command(name = "murmur", version, about)]
struct Cli {
    /// Host to bind.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (0 asks the OS for a free port).
    #[arg(long)]
    port: Option<u16>,

    /// Redis URL for the pub/sub bridge.
    #[arg(long)]
    redis_url: Option<String>,

    /// Base URL of the transcription sidecar.
    #[arg(long)]
    transcriber_url: Option<String>,

    /// Log filter when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    /// Overlay CLI flags on top of an environment-derived config.
    fn apply(&self, mut config: RelayConfig) -> RelayConfig {
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(url) = &self.redis_url {
            config.redis_url = url.clone();
        }
        if let Some(url) = &self.transcriber_url {
            config.transcriber_url = url.clone();
        }
        config
    }
}

fn init_tracing(args: &Cli) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level.clone()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if args.json_logs {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(&args);

    let config = args.apply(RelayConfig::from_env());
    let metrics_handle = metrics::install_recorder();

    let broker: Arc<dyn Broker> = Arc::new(RedisBroker::new(config.redis_url.clone()));
    if let Err(error) = broker.connect().await {
        tracing::warn!(%error, "broker unreachable at startup, connecting lazily");
    }
    let engine: Arc<dyn TranscriptionEngine> =
        Arc::new(SidecarEngine::new(config.transcriber_url.clone()));

    let shutdown_timeout = config.shutdown_timeout();
    let server = RelayServer::new(config, broker.clone(), engine, metrics_handle);
    let (addr, serve_handle) = server
        .listen()
        .await
        .context("failed to bind relay server")?;
    tracing::info!("murmur relay listening on http://{addr}");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    tracing::info!("shutting down");
    server
        .shutdown()
        .graceful_shutdown(vec![serve_handle], shutdown_timeout)
        .await;
    broker.close().await;
    tracing::info!("shutdown complete");
    Ok(())
}
