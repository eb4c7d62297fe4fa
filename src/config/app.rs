//! Application configuration structures.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use super::validation::{ConfigError, expand_path};
use crate::storage::{DEFAULT_CHANNEL_CAPACITY, DEFAULT_RRD_BIN};

// =============================================================================
// Constants
// =============================================================================

/// Default schema refresh interval (10 seconds).
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(10);

/// Minimum schema refresh interval (1 second).
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// Default capacity of the frame queue between ingress and the router.
pub const DEFAULT_INGRESS_CAPACITY: usize = 1_024;

fn default_refresh_interval() -> Duration {
    DEFAULT_REFRESH_INTERVAL
}

// =============================================================================
// Ingress Configuration
// =============================================================================

/// Frame listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngressConfig {
    /// Bind address (default: "127.0.0.1").
    pub bind: String,

    /// Port (default: 7600).
    pub port: u16,

    /// Frames buffered before readers wait (default: 1024).
    pub channel_capacity: usize,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 7600,
            channel_capacity: DEFAULT_INGRESS_CAPACITY,
        }
    }
}

// =============================================================================
// Storage Configuration
// =============================================================================

/// RRD storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory of the RRD files.
    pub base_dir: PathBuf,

    /// RRDtool binary, run as `<rrd_bin> -`.
    pub rrd_bin: PathBuf,

    /// Store requests queued for the worker (default: 10000).
    pub channel_capacity: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("/var/lib/metro-connector/rrd"),
            rrd_bin: PathBuf::from(DEFAULT_RRD_BIN),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

// =============================================================================
// Schema Configuration
// =============================================================================

/// Backend holding the storage schemas.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SchemaBackend {
    /// Configuration database (`perfdatasource`/`rra`/`pdsrra` tables).
    #[default]
    Sqlite,
    /// YAML settings file.
    Yaml,
}

/// Schema source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaConfig {
    #[serde(default)]
    pub backend: SchemaBackend,

    /// Database or settings file.
    pub path: PathBuf,

    /// Poll interval of the source's modification time (default: 10s).
    #[serde(default = "default_refresh_interval", with = "humantime_serde")]
    pub refresh_interval: Duration,
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub ingress: IngressConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    pub schema: SchemaConfig,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// `${VAR}` references in path fields are expanded.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse, expand and validate a YAML document.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yaml::from_str(content)?;
        config.expand_paths();
        config.validate()?;
        Ok(config)
    }

    fn expand_paths(&mut self) {
        for path in [
            &mut self.storage.base_dir,
            &mut self.storage.rrd_bin,
            &mut self.schema.path,
        ] {
            *path = expand_path(path);
        }
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ingress.bind.parse::<IpAddr>().map_err(|_| {
            ConfigError::ValidationError(format!(
                "invalid ingress bind address: '{}'",
                self.ingress.bind
            ))
        })?;

        if self.ingress.channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "ingress channel_capacity must be positive".to_string(),
            ));
        }

        if self.storage.channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "storage channel_capacity must be positive".to_string(),
            ));
        }

        if self.storage.base_dir.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "storage base_dir must not be empty".to_string(),
            ));
        }

        if self.storage.rrd_bin.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "storage rrd_bin must not be empty".to_string(),
            ));
        }

        if self.schema.path.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "schema path must not be empty".to_string(),
            ));
        }

        if self.schema.refresh_interval < MIN_REFRESH_INTERVAL {
            return Err(ConfigError::ValidationError(format!(
                "schema refresh_interval must be at least {}",
                humantime::format_duration(MIN_REFRESH_INTERVAL)
            )));
        }

        Ok(())
    }
}
