//! Storage worker with a dedicated thread and MPSC channel.
//!
//! Single-writer pattern: one thread owns the [`StorageChannel`] and executes
//! requests strictly in the order they were queued, so the create/update
//! sequence of any given file is never reordered.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::{self, JoinHandle};

use tokio::sync::mpsc::UnboundedSender;

use crate::schema::StorageSchema;
use crate::storage::StorageError;
use crate::storage::channel::StorageChannel;
use crate::storage::command::{RrdCommand, create_args, update_args};

// =============================================================================
// Commands
// =============================================================================

/// One validated, resolved sample to persist.
#[derive(Debug, Clone)]
pub struct StoreRequest {
    /// Target file, `<base>/<host>/<datasource>`.
    pub path: PathBuf,
    pub timestamp: i64,
    /// Escaped sample value.
    pub value: String,
    /// Schema used if the file has to be created.
    pub schema: Arc<StorageSchema>,
}

/// Commands sent to the storage worker.
#[derive(Debug)]
pub enum Command {
    /// Create the file if needed, then update it.
    Store(StoreRequest),
    /// Drain, stop the subprocess and exit.
    Shutdown,
}

/// What happened to a single store request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    /// File created, then updated.
    Created,
    /// Existing file updated.
    Updated,
    /// Update (or directory creation) failed; the sample is lost.
    Failed,
}

// =============================================================================
// Actor
// =============================================================================

/// Storage worker owning the RRDtool channel.
pub struct StorageActor {
    channel: StorageChannel,
    rx: Receiver<Command>,
    faults: Option<UnboundedSender<StorageError>>,
}

impl StorageActor {
    /// Start the engine, then spawn the worker thread.
    ///
    /// The engine is started on the caller's thread so a missing binary or an
    /// unusable base directory fails here, at startup.
    ///
    /// Fatal errors hit later are sent on `faults`, if given.
    pub fn spawn(
        mut channel: StorageChannel,
        channel_capacity: usize,
        faults: Option<UnboundedSender<StorageError>>,
    ) -> Result<(JoinHandle<()>, SyncSender<Command>), StorageError> {
        channel.ensure_running()?;

        let (tx, rx) = mpsc::sync_channel(channel_capacity);
        let mut actor = StorageActor {
            channel,
            rx,
            faults,
        };
        let handle = thread::Builder::new()
            .name("rrdtool-writer".to_string())
            .spawn(move || actor.run())
            .map_err(|e| StorageError::Internal(format!("failed to spawn storage worker: {e}")))?;

        Ok((handle, tx))
    }

    fn run(&mut self) {
        tracing::info!("Storage worker started");

        loop {
            match self.rx.recv() {
                Ok(Command::Store(request)) => {
                    self.store(&request);
                }
                Ok(Command::Shutdown) => {
                    tracing::info!("Storage worker shutting down");
                    break;
                }
                Err(_) => {
                    tracing::warn!("Channel disconnected, shutting down");
                    break;
                }
            }
        }

        self.channel.stop();
        tracing::info!(
            spawned = self.channel.spawn_count(),
            "Storage worker stopped"
        );
    }

    /// Create-if-missing then update; failures are logged and the request
    /// dropped. The update is skipped once the engine is known unusable.
    fn store(&mut self, req: &StoreRequest) -> StoreOutcome {
        if let Err(e) = ensure_parent_dir(&req.path) {
            tracing::error!(error = %e, path = %req.path.display(), "Dropping metric");
            return StoreOutcome::Failed;
        }

        let mut outcome = StoreOutcome::Updated;
        if !req.path.is_file() {
            let args = create_args(&req.schema, req.timestamp);
            match self.channel.run(RrdCommand::Create, &req.path, &args) {
                Ok(_) => {
                    tracing::debug!(path = %req.path.display(), "Created RRD file");
                    outcome = StoreOutcome::Created;
                }
                Err(e) if e.is_fatal() => {
                    self.report(e);
                    return StoreOutcome::Failed;
                }
                Err(e) => self.report(e),
            }
        }

        let args = update_args(req.timestamp, &req.value);
        match self.channel.run(RrdCommand::Update, &req.path, &args) {
            Ok(_) => outcome,
            Err(e) => {
                self.report(e);
                StoreOutcome::Failed
            }
        }
    }

    fn report(&self, e: StorageError) {
        if e.is_fatal() {
            tracing::error!(error = %e, "Storage engine unavailable");
            if let Some(faults) = &self.faults {
                let _ = faults.send(e);
            }
        } else {
            tracing::error!(error = %e, "Storage command failed");
        }
    }
}

/// Create the per-host directory of a storage file.
fn ensure_parent_dir(path: &Path) -> Result<(), StorageError> {
    match path.parent() {
        Some(parent) if !parent.exists() => {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::DirectoryAccess {
                path: parent.to_path_buf(),
                reason: format!("unable to create the directory: {e}"),
            })
        }
        _ => Ok(()),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::schema::{ArchiveSpec, Bound, ConsolidationFn, DatasourceSchema, DsType};
    use crate::storage::channel::tests::{fake_engine, recording_engine};
    use tempfile::tempdir;

    fn schema() -> Arc<StorageSchema> {
        Arc::new(StorageSchema {
            datasource: DatasourceSchema {
                id: 7,
                name: "load".to_string(),
                ds_type: DsType::Gauge,
                step: 60,
                heartbeat: 120,
                min: Bound::Value(0.0),
                max: Bound::Unknown,
            },
            archives: vec![ArchiveSpec {
                cf: ConsolidationFn::Last,
                xff: 0.5,
                step: 1,
                rows: 10,
            }],
        })
    }

    fn request(base: &Path, timestamp: i64, value: &str) -> StoreRequest {
        StoreRequest {
            path: base.join("srv1").join("load"),
            timestamp,
            value: value.to_string(),
            schema: schema(),
        }
    }

    #[test]
    fn test_actor_lifecycle() {
        let dir = tempdir().unwrap();
        let engine = recording_engine(dir.path(), &dir.path().join("log"));
        let channel = StorageChannel::new(engine, dir.path().join("rrd"));

        let (handle, tx) = StorageActor::spawn(channel, 10, None).unwrap();
        tx.send(Command::Shutdown).unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_store_creates_once_then_updates() {
        let dir = tempdir().unwrap();
        let log = dir.path().join("log");
        let base = dir.path().join("rrd");
        let engine = recording_engine(dir.path(), &log);

        let (handle, tx) =
            StorageActor::spawn(StorageChannel::new(engine, &base), 10, None).unwrap();
        tx.send(Command::Store(request(&base, 1000, "1.5"))).unwrap();
        tx.send(Command::Store(request(&base, 1060, "2.5"))).unwrap();
        tx.send(Command::Shutdown).unwrap();
        handle.join().unwrap();

        let path = base.join("srv1/load");
        let logged = std::fs::read_to_string(&log).unwrap();
        let lines: Vec<&str> = logged.lines().collect();
        assert_eq!(
            lines,
            vec![
                format!(
                    "create {} --step 60 --start 990 RRA:LAST:0.5:1:10 DS:load:GAUGE:120:0:U",
                    path.display()
                ),
                format!("update {} 1000:1.5", path.display()),
                format!("update {} 1060:2.5", path.display()),
            ]
        );
    }

    #[test]
    fn test_store_outcomes() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("rrd");
        let engine = recording_engine(dir.path(), &dir.path().join("log"));
        let mut channel = StorageChannel::new(engine, &base);
        channel.ensure_running().unwrap();

        let (_tx, rx) = mpsc::sync_channel(1);
        let mut actor = StorageActor {
            channel,
            rx,
            faults: None,
        };

        assert_eq!(actor.store(&request(&base, 1000, "1")), StoreOutcome::Created);
        assert_eq!(actor.store(&request(&base, 1001, "2")), StoreOutcome::Updated);
        actor.channel.stop();
    }

    #[test]
    fn test_fatal_create_skips_update() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("rrd");
        let engine = fake_engine(dir.path(), "rrdtool", "exit 0");
        let mut channel = StorageChannel::new(&engine, &base);
        channel.ensure_running().unwrap();

        // The engine is gone and cannot be restarted.
        std::fs::remove_file(&engine).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(100));

        let (fault_tx, mut fault_rx) = tokio::sync::mpsc::unbounded_channel();
        let (_tx, rx) = mpsc::sync_channel(1);
        let mut actor = StorageActor {
            channel,
            rx,
            faults: Some(fault_tx),
        };
        assert_eq!(actor.store(&request(&base, 1000, "1")), StoreOutcome::Failed);

        let fault = fault_rx.try_recv().unwrap();
        assert!(matches!(fault, StorageError::ProcessSpawn { .. }));
        assert!(fault_rx.try_recv().is_err());
        assert_eq!(actor.channel.spawn_count(), 1);
    }

    #[test]
    fn test_unwritable_parent_drops_metric() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("rrd");
        let engine = recording_engine(dir.path(), &dir.path().join("log"));
        let mut channel = StorageChannel::new(engine, &base);
        channel.ensure_running().unwrap();

        // A plain file where the host directory should be.
        std::fs::write(base.join("srv1"), "").unwrap();
        let mut req = request(&base, 1000, "1");
        req.path = base.join("srv1").join("sub").join("load");

        let (_tx, rx) = mpsc::sync_channel(1);
        let mut actor = StorageActor {
            channel,
            rx,
            faults: None,
        };
        assert_eq!(actor.store(&req), StoreOutcome::Failed);
        actor.channel.stop();
    }
}
