//! Metro Connector - metrics bus to RRDtool bridge
//!
//! Receives performance samples from a publish/subscribe bus and stores them
//! in round-robin databases through a persistent `rrdtool -` subprocess.
//!
//! # Architecture
//!
//! - **Ingress**: bus frames (chat bodies, item notifications) as JSON lines
//! - **Router**: validates `perf` elements and resolves their storage schema
//! - **Schema**: polled configuration source, SQLite database or YAML file
//! - **Storage**: single writer thread driving the RRDtool line protocol
//! - **Reload**: `SIGHUP` forces a schema refresh
//!
//! # Example
//!
//! ```rust,ignore
//! use metro_connector::{SchemaCache, SqliteProvider, StorageBuilder, MetricRouter};
//!
//! let mut cache = SchemaCache::new(Box::new(SqliteProvider::new("/etc/metro/conf.db")));
//! cache.refresh().await;
//!
//! let handles = StorageBuilder::new("/var/lib/rrd").build()?;
//! let router = MetricRouter::new(cache.reader(), handles.writer.clone(), "/var/lib/rrd");
//! router.dispatch(&frame)?;
//! ```

pub mod config;
pub mod connector;
pub mod ingress;
pub mod reload;
pub mod router;
pub mod schema;
pub mod storage;

pub use config::{AppConfig, ConfigError, SchemaBackend};
pub use connector::{Connector, ConnectorError, ConnectorInputs, schema_provider};
pub use ingress::{Element, Frame, IngressError, IngressListener};
pub use reload::{ReloadController, ReloadHook, ReloadTrigger, reload_channel};
pub use router::{MetricEvent, MetricRouter, RouteOutcome, RouterStats};
pub use schema::{
    RefreshOutcome, SchemaCache, SchemaError, SchemaProvider, SchemaReader, SqliteProvider,
    StorageSchema, YamlProvider,
};
pub use storage::{StorageBuilder, StorageError, StorageHandles, StorageWriter};
