//! Connector scheduler loop.
//!
//! One cooperative loop multiplexes everything that touches the schema cache
//! or the router: ingress frames, refresh ticks, reload requests, storage
//! faults and shutdown. Refreshes are therefore never concurrent.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc::{Receiver, UnboundedReceiver};
use tokio::time::MissedTickBehavior;

use crate::config::{ConfigError, SchemaBackend, SchemaConfig};
use crate::ingress::{Frame, IngressError};
use crate::reload::{ReloadController, ReloadRequests};
use crate::router::{MetricRouter, RouterStats};
use crate::schema::{SchemaCache, SchemaError, SchemaProvider, SqliteProvider, YamlProvider};
use crate::storage::StorageError;

/// Top-level error of the connector.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Ingress(#[from] IngressError),

    #[error("failed to install signal handler: {0}")]
    Signal(#[source] std::io::Error),
}

/// Build the schema provider selected by the configuration.
pub fn schema_provider(config: &SchemaConfig) -> Box<dyn SchemaProvider> {
    match config.backend {
        SchemaBackend::Sqlite => Box::new(SqliteProvider::new(&config.path)),
        SchemaBackend::Yaml => Box::new(YamlProvider::new(&config.path)),
    }
}

/// Event sources polled by [`Connector::run`].
pub struct ConnectorInputs {
    pub frames: Receiver<Frame>,
    pub reloads: ReloadRequests,
    /// Fatal storage errors raised after startup.
    pub faults: Option<UnboundedReceiver<StorageError>>,
}

/// Owns the schema cache and the router for the lifetime of the process.
pub struct Connector {
    cache: SchemaCache,
    router: MetricRouter,
    reloader: ReloadController,
    refresh_interval: Duration,
}

impl Connector {
    pub fn new(
        cache: SchemaCache,
        router: MetricRouter,
        reloader: ReloadController,
        refresh_interval: Duration,
    ) -> Self {
        Self {
            cache,
            router,
            reloader,
            refresh_interval,
        }
    }

    pub fn cache(&self) -> &SchemaCache {
        &self.cache
    }

    /// Run until `shutdown` resolves, ingress closes or storage fails.
    ///
    /// Consumes the connector so the router's writer is released on return.
    pub async fn run(
        mut self,
        inputs: ConnectorInputs,
        shutdown: impl Future<Output = ()>,
    ) -> Result<RouterStats, ConnectorError> {
        let ConnectorInputs {
            mut frames,
            mut reloads,
            mut faults,
        } = inputs;

        let mut ticker = tokio::time::interval(self.refresh_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick is immediate; the caller has done the initial load.
        ticker.tick().await;

        tokio::pin!(shutdown);
        tracing::info!(
            refresh_interval = %humantime::format_duration(self.refresh_interval),
            "Connector running"
        );

        let result = loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested");
                    break Ok(());
                }
                Some(fault) = next_fault(&mut faults) => {
                    tracing::error!(error = %fault, "Storage failed, stopping");
                    break Err(ConnectorError::Storage(fault));
                }
                Some(()) = reloads.recv() => {
                    self.reloader.handle(&mut self.cache).await;
                }
                _ = ticker.tick() => {
                    self.cache.refresh().await;
                }
                frame = frames.recv() => match frame {
                    Some(frame) => {
                        if let Err(e) = self.router.dispatch(&frame) {
                            break Err(e.into());
                        }
                    }
                    None => {
                        tracing::info!("Ingress closed");
                        break Ok(());
                    }
                },
            }
        };

        frames.close();
        self.router.log_summary();
        let stats = self.router.stats();
        result.map(|()| stats)
    }
}

async fn next_fault(faults: &mut Option<UnboundedReceiver<StorageError>>) -> Option<StorageError> {
    match faults {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
