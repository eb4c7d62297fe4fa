//! Core data types for storage schemas.
//!
//! - [`DatasourceSchema`]: per-metric definition (type, step, heartbeat, bounds)
//! - [`ArchiveSpec`]: retention/consolidation rule, owned in order by a datasource
//! - [`StorageSchema`]: a datasource together with its ordered archives
//! - [`SchemaKey`] / [`SchemaMap`]: the escaped `(host, datasource)` index

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::schema::SchemaError;

/// Data source type, as understood by RRDtool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, AsRefStr)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum DsType {
    Gauge,
    Counter,
    Derive,
    Absolute,
}

/// Consolidation function of an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, AsRefStr)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum ConsolidationFn {
    Average,
    Min,
    Max,
    Last,
}

/// Lower or upper bound of a data source.
///
/// Renders as `U` when unknown, which is RRDtool's sentinel for "unbounded".
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "BoundRepr", into = "BoundRepr")]
pub enum Bound {
    #[default]
    Unknown,
    Value(f64),
}

impl Bound {
    /// Build a bound from a nullable database column.
    pub fn from_option(value: Option<f64>) -> Self {
        value.map_or(Self::Unknown, Self::Value)
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => f.write_str("U"),
            Self::Value(v) => write!(f, "{v}"),
        }
    }
}

/// On-disk shape of a bound: a number, `"U"`, or null.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum BoundRepr {
    Number(f64),
    Text(String),
    Null(()),
}

impl TryFrom<BoundRepr> for Bound {
    type Error = String;

    fn try_from(repr: BoundRepr) -> Result<Self, Self::Error> {
        match repr {
            BoundRepr::Number(v) => Ok(Self::Value(v)),
            BoundRepr::Null(()) => Ok(Self::Unknown),
            BoundRepr::Text(s) if s.trim().eq_ignore_ascii_case("u") => Ok(Self::Unknown),
            BoundRepr::Text(s) => s
                .trim()
                .parse::<f64>()
                .map(Self::Value)
                .map_err(|_| format!("invalid bound '{s}': expected a number or \"U\"")),
        }
    }
}

impl From<Bound> for BoundRepr {
    fn from(bound: Bound) -> Self {
        match bound {
            Bound::Unknown => Self::Text("U".to_string()),
            Bound::Value(v) => Self::Number(v),
        }
    }
}

/// Per-metric storage definition.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasourceSchema {
    /// Identifier in the configuration source.
    pub id: i64,
    /// RRDtool data source name (`[A-Za-z0-9_]`, at most 19 characters).
    pub name: String,
    pub ds_type: DsType,
    /// Base interval in seconds.
    pub step: u64,
    /// Maximum seconds between updates before the value becomes unknown.
    pub heartbeat: u64,
    pub min: Bound,
    pub max: Bound,
}

/// Retention/consolidation rule for a data source.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveSpec {
    pub cf: ConsolidationFn,
    /// Fraction of unknown primary points still allowed in a consolidated point.
    pub xff: f64,
    /// Number of primary points per consolidated point.
    pub step: u64,
    /// Number of consolidated points retained.
    pub rows: u64,
}

impl ArchiveSpec {
    /// Check the archive is acceptable to the storage engine.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if !(0.0..=1.0).contains(&self.xff) {
            return Err(SchemaError::InvalidRecord(format!(
                "archive xff {} is outside [0, 1]",
                self.xff
            )));
        }
        if self.step == 0 || self.rows == 0 {
            return Err(SchemaError::InvalidRecord(
                "archive step and rows must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// A datasource with its archives, in the order they must be created.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageSchema {
    pub datasource: DatasourceSchema,
    pub archives: Vec<ArchiveSpec>,
}

impl StorageSchema {
    /// Check step/heartbeat and every archive.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.datasource.step == 0 || self.datasource.heartbeat == 0 {
            return Err(SchemaError::InvalidRecord(format!(
                "datasource '{}': step and heartbeat must be positive",
                self.datasource.name
            )));
        }
        self.archives.iter().try_for_each(ArchiveSpec::validate)
    }
}

/// Lookup key: escaped host and escaped datasource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaKey {
    pub host: String,
    pub datasource: String,
}

impl SchemaKey {
    /// Build a key from components that are already escaped.
    pub fn new(host: impl Into<String>, datasource: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            datasource: datasource.into(),
        }
    }
}

impl fmt::Display for SchemaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.host, self.datasource)
    }
}

/// Full `(host, datasource)` to schema mapping, as produced by a provider.
pub type SchemaMap = HashMap<SchemaKey, Arc<StorageSchema>>;
