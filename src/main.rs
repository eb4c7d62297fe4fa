//! Metro Connector Binary Entry Point
//!
//! Wires the ingress listener, schema cache, router and RRDtool storage
//! together and runs the scheduler loop on a single thread.

use clap::Parser;
use metro_connector::{
    AppConfig, Connector, ConnectorError, ConnectorInputs, IngressListener, MetricRouter,
    ReloadController, SchemaCache, StorageBuilder, reload_channel, schema_provider,
};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Metro Connector - metrics bus to RRDtool bridge
#[derive(Parser, Debug)]
#[command(name = "metro-connector", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        default_value = "/etc/metro-connector/config.yaml",
        env = "METRO_CONFIG"
    )]
    config: String,

    /// RRDtool binary (overrides config file)
    #[arg(long, env = "METRO_RRD_BIN")]
    rrd_bin: Option<String>,

    /// RRD base directory (overrides config file)
    #[arg(long, env = "METRO_BASE_DIR")]
    base_dir: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,metro_connector=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Metro Connector - metrics bus to RRDtool bridge");

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration from file
    tracing::info!(path = %cli.config, "Loading configuration");
    let mut config = AppConfig::load(&cli.config)?;

    // Apply CLI/env overrides (CLI > ENV > config file)
    if let Some(rrd_bin) = cli.rrd_bin {
        config.storage.rrd_bin = rrd_bin.into();
    }
    if let Some(base_dir) = cli.base_dir {
        config.storage.base_dir = base_dir.into();
    }
    config.validate()?;

    tracing::info!(
        ingress = %format!("{}:{}", config.ingress.bind, config.ingress.port),
        base_dir = %config.storage.base_dir.display(),
        rrd_bin = %config.storage.rrd_bin.display(),
        schema = %config.schema.backend,
        "Configuration loaded"
    );

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "Connector stopped with an error");
        return Err(e.into());
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn run(config: AppConfig) -> Result<(), ConnectorError> {
    // Initial schema load, no reload chaining
    let mut cache = SchemaCache::new(schema_provider(&config.schema));
    cache.refresh().await;

    // Build storage layer; a missing binary or unusable base dir stops here
    let mut handles = StorageBuilder::new(&config.storage.base_dir)
        .rrd_bin(&config.storage.rrd_bin)
        .channel_capacity(config.storage.channel_capacity)
        .build()?;
    tracing::info!("Storage initialized");

    let router = MetricRouter::new(cache.reader(), handles.writer.clone(), handles.base_dir());

    // Ingress
    let listener = IngressListener::bind(&config.ingress.bind, config.ingress.port).await?;
    let (frame_tx, frames) = mpsc::channel(config.ingress.channel_capacity);
    let ingress = tokio::spawn(listener.run(frame_tx));

    // Reload trigger
    let (trigger, reloads) = reload_channel();
    #[cfg(unix)]
    let hangup = metro_connector::reload::listen_for_hangup(trigger)
        .map_err(ConnectorError::Signal)?;
    #[cfg(not(unix))]
    let _trigger = trigger;

    let inputs = ConnectorInputs {
        frames,
        reloads,
        faults: handles.take_faults(),
    };
    let connector = Connector::new(
        cache,
        router,
        ReloadController::new(None),
        config.schema.refresh_interval,
    );
    let result = connector.run(inputs, shutdown_signal()).await;

    ingress.abort();
    #[cfg(unix)]
    hangup.abort();

    tracing::info!("Shutting down storage...");
    if let Err(e) = handles.shutdown() {
        tracing::error!(error = %e, "Failed to shutdown storage");
    }

    result.map(|stats| {
        tracing::debug!(?stats, "Connector finished");
    })
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }
}
