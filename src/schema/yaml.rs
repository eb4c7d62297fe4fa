//! YAML settings-file backend.
//!
//! ```yaml
//! hosts:
//!   srv1:
//!     cpu:
//!       id: 1
//!       type: GAUGE
//!       step: 300
//!       heartbeat: 600
//!       min: 0
//!       max: U
//!       rra:
//!         - { type: AVERAGE, xff: 0.5, step: 1, rows: 600 }
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;

use crate::schema::provider::{Marker, RawArchive, RawDatasource, file_marker, insert_entry};
use crate::schema::{Bound, SchemaError, SchemaMap, SchemaProvider};

#[derive(Debug, Deserialize)]
struct SchemaFile {
    #[serde(default)]
    hosts: BTreeMap<String, BTreeMap<String, DatasourceEntry>>,
}

#[derive(Debug, Deserialize)]
struct DatasourceEntry {
    #[serde(default)]
    id: i64,
    #[serde(rename = "type")]
    ds_type: String,
    step: i64,
    heartbeat: i64,
    #[serde(default)]
    min: Bound,
    #[serde(default)]
    max: Bound,
    #[serde(default)]
    rra: Vec<ArchiveEntry>,
}

#[derive(Debug, Deserialize)]
struct ArchiveEntry {
    #[serde(rename = "type")]
    cf: String,
    xff: f64,
    step: i64,
    rows: i64,
}

impl From<&ArchiveEntry> for RawArchive {
    fn from(entry: &ArchiveEntry) -> Self {
        Self {
            cf: entry.cf.clone(),
            xff: entry.xff,
            step: entry.step,
            rows: entry.rows,
        }
    }
}

/// Schema provider backed by a YAML settings file.
#[derive(Debug, Clone)]
pub struct YamlProvider {
    path: PathBuf,
}

impl YamlProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Parse a settings document into a mapping.
    fn parse(&self, content: &str) -> Result<SchemaMap, SchemaError> {
        let file: SchemaFile = serde_yaml::from_str(content)?;
        let source = self.describe();

        let mut map = SchemaMap::new();
        for (host, datasources) in &file.hosts {
            for (name, entry) in datasources {
                let raw = RawDatasource {
                    id: entry.id,
                    host: host.clone(),
                    name: name.clone(),
                    ds_type: entry.ds_type.clone(),
                    step: entry.step,
                    heartbeat: entry.heartbeat,
                    min: entry.min,
                    max: entry.max,
                };
                let archives: Vec<RawArchive> = entry.rra.iter().map(RawArchive::from).collect();
                insert_entry(&mut map, &source, &raw, &archives);
            }
        }
        Ok(map)
    }
}

#[async_trait]
impl SchemaProvider for YamlProvider {
    fn describe(&self) -> String {
        format!("yaml:{}", self.path.display())
    }

    async fn marker(&self) -> Result<Option<Marker>, SchemaError> {
        file_marker(&self.path).await
    }

    async fn load(&self) -> Result<SchemaMap, SchemaError> {
        let content =
            tokio::fs::read_to_string(&self.path)
                .await
                .map_err(|source| SchemaError::Io {
                    path: self.path.clone(),
                    source,
                })?;
        self.parse(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ConsolidationFn, DsType, SchemaKey};
    use tempfile::tempdir;

    const SETTINGS: &str = r#"
hosts:
  srv1:
    cpu:
      id: 1
      type: GAUGE
      step: 300
      heartbeat: 600
      min: 0
      max: 100
      rra:
        - { type: AVERAGE, xff: 0.5, step: 1, rows: 600 }
        - { type: MIN, xff: 0.5, step: 12, rows: 700 }
    "/var usage":
      type: gauge
      step: 60
      heartbeat: 120
  srv2:
    broken:
      type: SPARKLINE
      step: 60
      heartbeat: 120
"#;

    #[tokio::test]
    async fn test_load_settings() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hosts.yaml");
        std::fs::write(&path, SETTINGS).unwrap();

        let map = YamlProvider::new(&path).load().await.unwrap();
        assert_eq!(map.len(), 2);

        let cpu = &map[&SchemaKey::new("srv1", "cpu")];
        assert_eq!(cpu.datasource.ds_type, DsType::Gauge);
        assert_eq!(cpu.datasource.max, Bound::Value(100.0));
        let cfs: Vec<_> = cpu.archives.iter().map(|a| a.cf).collect();
        assert_eq!(cfs, vec![ConsolidationFn::Average, ConsolidationFn::Min]);

        let var = &map[&SchemaKey::new("srv1", "%2Fvar%20usage")];
        assert_eq!(var.datasource.min, Bound::Unknown);
        assert!(var.archives.is_empty());
    }

    #[test]
    fn test_parse_error() {
        let provider = YamlProvider::new("unused.yaml");
        assert!(matches!(
            provider.parse("hosts: [not, a, map]"),
            Err(SchemaError::Yaml(_))
        ));
        assert!(provider.parse("{}").unwrap().is_empty());
    }
}
