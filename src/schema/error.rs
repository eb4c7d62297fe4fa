//! Schema-specific error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading storage schemas from a configuration source.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Reading the configuration source failed.
    #[error("failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration database query failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// YAML settings file could not be parsed.
    #[error("failed to parse YAML schema file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A record is inconsistent (unknown enum value, out-of-range field).
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}
