//! Socket ingestion service entry point

use anyhow::{Context, Result};
use clap::Parser;
use socket_config::dump_configuration;
use socket_ingest::{load_config, IngestService, LoggingSink};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Domain document: message type key fields and domain to topic pairs (JSON)
    #[arg(long, default_value = "config/domain.json")]
    domain_config: PathBuf,

    /// Application property document
    #[arg(long, default_value = "config/app.properties")]
    app_config: PathBuf,

    /// Listen port, overriding the property document and environment
    #[arg(short, long)]
    port: Option<u16>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(args: &Args) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    if args.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args);

    info!("Starting socket ingestion service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut loaded = load_config(&args.app_config, &args.domain_config)
        .context("Failed to load configuration")?;
    if let Some(port) = args.port {
        loaded.settings = loaded.settings.with_port(port);
    }

    dump_configuration(loaded.properties.iter());

    let service = IngestService::start(loaded.settings, loaded.store, Arc::new(LoggingSink))
        .await
        .context("Failed to start ingest service")?;
    info!(address = %service.local_addr(), "Accepting connections");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to install CTRL+C signal handler")?;
    info!("Shutdown signal received");

    let stats = service.server_stats();
    service.shutdown().await.context("Shutdown failed")?;
    info!(
        connections = stats.connections_accepted,
        messages = stats.messages_enqueued,
        "Socket ingestion service stopped"
    );
    Ok(())
}
