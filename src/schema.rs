//! Schema Layer
//!
//! Resolves an escaped `(host, datasource)` pair to the parameters needed to
//! create its storage file.
//!
//! # Components
//!
//! - [`SchemaCache`]: polled mapping with last-known-good semantics
//! - [`SchemaReader`]: lookup handle shared with the router
//! - [`SchemaProvider`]: configuration source, [`SqliteProvider`] or [`YamlProvider`]

mod cache;
mod error;
mod provider;
mod sqlite;
mod types;
mod yaml;

pub use cache::{RefreshOutcome, SchemaCache, SchemaReader};
pub use error::SchemaError;
pub use provider::{Marker, SchemaProvider};
pub use sqlite::SqliteProvider;
pub use types::{
    ArchiveSpec, Bound, ConsolidationFn, DatasourceSchema, DsType, SchemaKey, SchemaMap,
    StorageSchema,
};
pub use yaml::YamlProvider;
