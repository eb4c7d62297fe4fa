//! Storage builder and handles.
//!
//! Provides a builder pattern for constructing the storage layer
//! and a handles struct for accessing the storage facades.

use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use tokio::sync::mpsc::{self, UnboundedReceiver};

use crate::storage::actor::StorageActor;
use crate::storage::channel::StorageChannel;
use crate::storage::{StorageAdmin, StorageError, StorageWriter};

/// Default channel capacity for store requests.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 10_000;

/// Default storage engine binary, looked up in `PATH`.
pub const DEFAULT_RRD_BIN: &str = "rrdtool";

/// Builder for constructing the storage layer.
pub struct StorageBuilder {
    base_dir: PathBuf,
    rrd_bin: PathBuf,
    channel_capacity: usize,
}

impl StorageBuilder {
    /// Create a new storage builder writing under `base_dir`.
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            rrd_bin: PathBuf::from(DEFAULT_RRD_BIN),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Set the storage engine binary.
    pub fn rrd_bin(mut self, path: impl AsRef<Path>) -> Self {
        self.rrd_bin = path.as_ref().to_path_buf();
        self
    }

    /// Set the channel capacity for store requests.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Start the storage engine and the worker, and return handles.
    ///
    /// # Errors
    /// `ProcessSpawn` or `DirectoryAccess` if the engine cannot be started.
    pub fn build(self) -> Result<StorageHandles, StorageError> {
        let (fault_tx, fault_rx) = mpsc::unbounded_channel();
        let channel = StorageChannel::new(&self.rrd_bin, &self.base_dir);

        let (actor_handle, tx) =
            StorageActor::spawn(channel, self.channel_capacity, Some(fault_tx))?;

        Ok(StorageHandles {
            writer: StorageWriter::new(tx.clone()),
            admin: StorageAdmin::new(tx),
            base_dir: self.base_dir,
            faults: Some(fault_rx),
            actor_handle: Some(actor_handle),
        })
    }
}

/// Handles to the storage layer facades.
pub struct StorageHandles {
    /// Writer facade for store requests.
    pub writer: StorageWriter,
    /// Facade for storage administration.
    pub admin: StorageAdmin,
    base_dir: PathBuf,
    faults: Option<UnboundedReceiver<StorageError>>,
    /// Internal worker handle for graceful shutdown.
    actor_handle: Option<JoinHandle<()>>,
}

impl StorageHandles {
    /// Root directory of the storage files.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Take the receiver of fatal errors the worker hits after startup.
    pub fn take_faults(&mut self) -> Option<UnboundedReceiver<StorageError>> {
        self.faults.take()
    }

    /// Gracefully shutdown the storage layer.
    ///
    /// Queued requests are processed before the worker exits.
    pub fn shutdown(mut self) -> Result<(), StorageError> {
        self.admin.shutdown()?;

        if let Some(handle) = self.actor_handle.take() {
            handle
                .join()
                .map_err(|_| StorageError::Internal("Failed to join storage worker".to_string()))?;
        }

        Ok(())
    }
}

impl Drop for StorageHandles {
    fn drop(&mut self) {
        if self.actor_handle.is_some() {
            let _ = self.admin.shutdown();
            if let Some(handle) = self.actor_handle.take() {
                let _ = handle.join();
            }
        }
    }
}
