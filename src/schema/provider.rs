//! Pluggable configuration sources for storage schemas.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::schema::{
    ArchiveSpec, Bound, ConsolidationFn, DatasourceSchema, DsType, SchemaError, SchemaKey,
    SchemaMap, StorageSchema,
};
use crate::storage::{ds_name, escape};

/// Modification marker of a configuration source.
pub type Marker = DateTime<Utc>;

/// A configuration source the schema cache can poll and load.
///
/// Implementations must build the whole mapping in [`load`](Self::load); the
/// cache swaps it in as a single step.
#[async_trait]
pub trait SchemaProvider: Send + Sync + 'static {
    /// Human-readable description for logs (backend and location).
    fn describe(&self) -> String;

    /// Current modification marker, or `None` if the source does not exist.
    async fn marker(&self) -> Result<Option<Marker>, SchemaError>;

    /// Read the full `(host, datasource)` mapping.
    async fn load(&self) -> Result<SchemaMap, SchemaError>;
}

/// A datasource row as stored by a backend, before validation.
#[derive(Debug, Clone)]
pub(crate) struct RawDatasource {
    pub id: i64,
    pub host: String,
    pub name: String,
    pub ds_type: String,
    pub step: i64,
    pub heartbeat: i64,
    pub min: Bound,
    pub max: Bound,
}

/// An archive row as stored by a backend, before validation.
#[derive(Debug, Clone)]
pub(crate) struct RawArchive {
    pub cf: String,
    pub xff: f64,
    pub step: i64,
    pub rows: i64,
}

fn positive(field: &str, value: i64) -> Result<u64, SchemaError> {
    u64::try_from(value)
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| SchemaError::InvalidRecord(format!("{field} must be positive, got {value}")))
}

/// Validate raw rows into an escaped key and a typed schema.
pub(crate) fn build_entry(
    raw: &RawDatasource,
    archives: &[RawArchive],
) -> Result<(SchemaKey, StorageSchema), SchemaError> {
    let ds_type = DsType::from_str(&raw.ds_type).map_err(|_| {
        SchemaError::InvalidRecord(format!("unknown datasource type '{}'", raw.ds_type))
    })?;

    let archives = archives
        .iter()
        .map(|rra| {
            let cf = ConsolidationFn::from_str(&rra.cf).map_err(|_| {
                SchemaError::InvalidRecord(format!("unknown consolidation function '{}'", rra.cf))
            })?;
            Ok(ArchiveSpec {
                cf,
                xff: rra.xff,
                step: positive("archive step", rra.step)?,
                rows: positive("archive rows", rra.rows)?,
            })
        })
        .collect::<Result<Vec<_>, SchemaError>>()?;

    let key = SchemaKey::new(escape(&raw.host), escape(&raw.name));
    let schema = StorageSchema {
        datasource: DatasourceSchema {
            id: raw.id,
            name: ds_name(&raw.name),
            ds_type,
            step: positive("step", raw.step)?,
            heartbeat: positive("heartbeat", raw.heartbeat)?,
            min: raw.min,
            max: raw.max,
        },
        archives,
    };
    schema.validate()?;

    Ok((key, schema))
}

/// Add one validated entry to `map`, skipping invalid ones with a warning.
pub(crate) fn insert_entry(
    map: &mut SchemaMap,
    source: &str,
    raw: &RawDatasource,
    archives: &[RawArchive],
) {
    match build_entry(raw, archives) {
        Ok((key, schema)) => {
            if map.insert(key.clone(), Arc::new(schema)).is_some() {
                tracing::warn!(%source, key = %key, "Duplicate datasource, keeping the last one");
            }
        }
        Err(e) => {
            tracing::warn!(%source, host = %raw.host, datasource = %raw.name, error = %e, "Skipping datasource");
        }
    }
}

/// Modification time of a file, `None` if it does not exist.
pub(crate) async fn file_marker(path: &Path) -> Result<Option<Marker>, SchemaError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => {
            let modified = meta.modified().map_err(|source| SchemaError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            Ok(Some(DateTime::<Utc>::from(modified)))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(SchemaError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn raw(name: &str, ds_type: &str) -> RawDatasource {
        RawDatasource {
            id: 3,
            host: "srv 1".to_string(),
            name: name.to_string(),
            ds_type: ds_type.to_string(),
            step: 300,
            heartbeat: 600,
            min: Bound::Value(0.0),
            max: Bound::Unknown,
        }
    }

    fn average() -> RawArchive {
        RawArchive {
            cf: "AVERAGE".to_string(),
            xff: 0.5,
            step: 1,
            rows: 600,
        }
    }

    #[test]
    fn test_build_entry_escapes_key_and_restricts_ds_name() {
        let (key, schema) = build_entry(&raw("Load 1", "gauge"), &[average()]).unwrap();
        assert_eq!(key, SchemaKey::new("srv%201", "Load%201"));
        assert_eq!(schema.datasource.name, "Load_1");
        assert_eq!(schema.datasource.ds_type, DsType::Gauge);
        assert_eq!(schema.archives.len(), 1);
    }

    #[test]
    fn test_build_entry_rejects_bad_records() {
        assert!(build_entry(&raw("cpu", "HISTOGRAM"), &[]).is_err());

        let mut zero_step = raw("cpu", "GAUGE");
        zero_step.step = 0;
        assert!(build_entry(&zero_step, &[]).is_err());

        let mut bad_rra = average();
        bad_rra.cf = "MEDIAN".to_string();
        assert!(build_entry(&raw("cpu", "GAUGE"), &[bad_rra]).is_err());

        let mut bad_xff = average();
        bad_xff.xff = 2.0;
        assert!(build_entry(&raw("cpu", "GAUGE"), &[bad_xff]).is_err());
    }

    #[test]
    fn test_create_args_use_valid_ds_name() {
        let mut counter = raw("eth0 in", "COUNTER");
        counter.host = "srv1".to_string();
        let (key, schema) = build_entry(&counter, &[]).unwrap();
        assert_eq!(key, SchemaKey::new("srv1", "eth0%20in"));
        assert_eq!(
            crate::storage::create_args(&schema, 1000),
            "--step 300 --start 990 DS:eth0_in:COUNTER:600:0:U"
        );
    }

    #[test]
    fn test_insert_entry_skips_invalid() {
        let mut map = SchemaMap::new();
        insert_entry(&mut map, "test", &raw("cpu", "GAUGE"), &[average()]);
        insert_entry(&mut map, "test", &raw("mem", "BOGUS"), &[]);
        assert_eq!(map.len(), 1);
        assert!(map.contains_key(&SchemaKey::new("srv%201", "cpu")));
    }

    #[tokio::test]
    async fn test_file_marker() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("conf.yaml");
        assert!(file_marker(&path).await.unwrap().is_none());

        std::fs::write(&path, "hosts: {}\n").unwrap();
        assert!(file_marker(&path).await.unwrap().is_some());
    }
}
