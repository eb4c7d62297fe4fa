//! SQLite configuration database backend using sqlx.
//!
//! Reads the layout generated by the configuration tool:
//!
//! - `perfdatasource(idperfdatasource, hostname, name, type, step, heartbeat, min, max)`
//! - `rra(idrra, type, xff, step, rows)`
//! - `pdsrra(idperfdatasource, idrra)`: archives of a datasource, in insertion order
//!
//! The database is opened read-only for each reload and closed afterwards, so a
//! file replaced by the configuration tool is always read afresh.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool as SqlxPool, SqlitePoolOptions};

use crate::schema::provider::{Marker, RawArchive, RawDatasource, file_marker, insert_entry};
use crate::schema::{Bound, SchemaError, SchemaMap, SchemaProvider};

/// Connections in the pool; a reload issues its queries sequentially.
const MAX_CONNECTIONS: u32 = 1;

/// Connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const DATASOURCES_QUERY: &str = r#"
    SELECT idperfdatasource AS id,
           hostname,
           name,
           type,
           CAST(step AS INTEGER) AS step,
           CAST(heartbeat AS INTEGER) AS heartbeat,
           CAST(min AS REAL) AS min,
           CAST(max AS REAL) AS max
    FROM perfdatasource
"#;

const ARCHIVES_QUERY: &str = r#"
    SELECT pdsrra.idperfdatasource AS id,
           rra.type AS type,
           CAST(rra.xff AS REAL) AS xff,
           CAST(rra.step AS INTEGER) AS step,
           CAST(rra.rows AS INTEGER) AS rows
    FROM pdsrra
    JOIN rra ON rra.idrra = pdsrra.idrra
    ORDER BY pdsrra.rowid
"#;

/// Read-only SQLite connection pool wrapper.
struct ConfigDb {
    inner: SqlxPool,
}

impl std::fmt::Debug for ConfigDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigDb").finish_non_exhaustive()
    }
}

impl ConfigDb {
    /// Open an existing database file read-only.
    async fn open(path: &Path) -> Result<Self, SchemaError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .read_only(true)
            .create_if_missing(false);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(CONNECT_TIMEOUT)
            .connect_with(options)
            .await?;

        Ok(Self { inner: pool })
    }

    /// Close the connection pool gracefully.
    async fn close(&self) {
        self.inner.close().await;
    }

    /// Read every datasource with its archives.
    async fn read_all(&self) -> Result<(Vec<RawDatasource>, HashMap<i64, Vec<RawArchive>>), SchemaError> {
        let datasources = sqlx::query(DATASOURCES_QUERY)
            .fetch_all(&self.inner)
            .await?
            .iter()
            .map(|row| {
                Ok(RawDatasource {
                    id: row.try_get("id")?,
                    host: row.try_get("hostname")?,
                    name: row.try_get("name")?,
                    ds_type: row.try_get("type")?,
                    step: row.try_get("step")?,
                    heartbeat: row.try_get("heartbeat")?,
                    min: Bound::from_option(row.try_get("min")?),
                    max: Bound::from_option(row.try_get("max")?),
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        let mut archives: HashMap<i64, Vec<RawArchive>> = HashMap::new();
        for row in sqlx::query(ARCHIVES_QUERY).fetch_all(&self.inner).await? {
            let id: i64 = row.try_get("id")?;
            archives.entry(id).or_default().push(RawArchive {
                cf: row.try_get("type")?,
                xff: row.try_get("xff")?,
                step: row.try_get("step")?,
                rows: row.try_get("rows")?,
            });
        }

        Ok((datasources, archives))
    }
}

/// Schema provider backed by the configuration database.
#[derive(Debug, Clone)]
pub struct SqliteProvider {
    path: PathBuf,
}

impl SqliteProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SchemaProvider for SqliteProvider {
    fn describe(&self) -> String {
        format!("sqlite:{}", self.path.display())
    }

    async fn marker(&self) -> Result<Option<Marker>, SchemaError> {
        file_marker(&self.path).await
    }

    async fn load(&self) -> Result<SchemaMap, SchemaError> {
        tracing::debug!(path = %self.path.display(), "Connecting to the configuration database");
        let db = ConfigDb::open(&self.path).await?;
        let result = db.read_all().await;
        db.close().await;
        let (datasources, archives) = result?;

        let source = self.describe();
        let mut map = SchemaMap::with_capacity(datasources.len());
        for raw in &datasources {
            let rras = archives.get(&raw.id).map(Vec::as_slice).unwrap_or_default();
            insert_entry(&mut map, &source, raw, rras);
        }
        Ok(map)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::schema::{ConsolidationFn, DsType, SchemaKey};
    use tempfile::tempdir;

    /// Create a configuration database with one GAUGE and one COUNTER datasource.
    pub(crate) async fn seed_database(path: &Path) {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();

        for stmt in [
            "CREATE TABLE perfdatasource (idperfdatasource INTEGER PRIMARY KEY, hostname TEXT, name TEXT, type TEXT, step INTEGER, heartbeat INTEGER, min REAL, max REAL)",
            "CREATE TABLE rra (idrra INTEGER PRIMARY KEY, type TEXT, xff REAL, step INTEGER, rows INTEGER)",
            "CREATE TABLE pdsrra (idperfdatasource INTEGER, idrra INTEGER)",
            "INSERT INTO perfdatasource VALUES (1, 'srv1', 'cpu', 'GAUGE', 300, 600, 0, 100)",
            "INSERT INTO perfdatasource VALUES (2, 'srv1', 'eth0 in', 'COUNTER', 300, 600, NULL, NULL)",
            "INSERT INTO rra VALUES (10, 'MAX', 0.5, 6, 700)",
            "INSERT INTO rra VALUES (11, 'AVERAGE', 0.5, 1, 600)",
            "INSERT INTO pdsrra VALUES (1, 11)",
            "INSERT INTO pdsrra VALUES (1, 10)",
            "INSERT INTO pdsrra VALUES (2, 11)",
        ] {
            sqlx::query(stmt).execute(&pool).await.unwrap();
        }
        pool.close().await;
    }

    #[tokio::test]
    async fn test_load_database() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("conf.db");
        seed_database(&path).await;

        let provider = SqliteProvider::new(&path);
        assert!(provider.marker().await.unwrap().is_some());

        let map = provider.load().await.unwrap();
        assert_eq!(map.len(), 2);

        let cpu = &map[&SchemaKey::new("srv1", "cpu")];
        assert_eq!(cpu.datasource.id, 1);
        assert_eq!(cpu.datasource.ds_type, DsType::Gauge);
        assert_eq!(cpu.datasource.min, Bound::Value(0.0));
        assert_eq!(cpu.datasource.max, Bound::Value(100.0));
        // Archives come back in link order, not rra id order.
        let cfs: Vec<_> = cpu.archives.iter().map(|a| a.cf).collect();
        assert_eq!(cfs, vec![ConsolidationFn::Average, ConsolidationFn::Max]);

        let eth = &map[&SchemaKey::new("srv1", "eth0%20in")];
        assert_eq!(eth.datasource.min, Bound::Unknown);
        assert_eq!(eth.datasource.max, Bound::Unknown);
        assert_eq!(eth.archives.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_database() {
        let dir = tempdir().unwrap();
        let provider = SqliteProvider::new(dir.path().join("absent.db"));

        assert!(provider.marker().await.unwrap().is_none());
        assert!(provider.load().await.is_err());
    }
}
