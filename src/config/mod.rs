//! Configuration module.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Ingress listener (bind address, port, queue size)
//! - RRD storage (base directory, binary, queue size)
//! - Schema source (backend, path, refresh interval)

mod app;
mod validation;

pub use app::{AppConfig, IngressConfig, SchemaBackend, SchemaConfig, StorageConfig};
pub use validation::{ConfigError, expand_env_vars, expand_path};

// Re-export constants
pub use app::{DEFAULT_INGRESS_CAPACITY, DEFAULT_REFRESH_INTERVAL, MIN_REFRESH_INTERVAL};
