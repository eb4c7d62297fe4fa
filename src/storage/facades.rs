//! User-facing storage facades.
//!
//! - `StorageWriter`: queue store requests for the storage worker
//! - `StorageAdmin`: shutdown of the worker

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::SyncSender;

use crate::storage::StorageError;
use crate::storage::actor::{Command, StoreRequest};

// =============================================================================
// Writer
// =============================================================================

/// Storage writer.
///
/// Uses a blocking `send`: when the worker's queue is full the caller waits
/// instead of dropping the sample.
#[derive(Clone)]
pub struct StorageWriter {
    tx: SyncSender<Command>,
    submitted: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
}

impl std::fmt::Debug for StorageWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageWriter").finish_non_exhaustive()
    }
}

impl StorageWriter {
    pub(crate) fn new(tx: SyncSender<Command>) -> Self {
        Self {
            tx,
            submitted: Arc::new(AtomicU64::new(0)),
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Queue a sample for creation/update.
    pub fn store(&self, request: StoreRequest) -> Result<(), StorageError> {
        if self.tx.send(Command::Store(request)).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return Err(StorageError::ChannelSend);
        }
        self.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Requests accepted by the worker queue.
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    /// Requests lost because the worker was gone.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Admin
// =============================================================================

/// Storage administration.
#[derive(Clone)]
pub struct StorageAdmin {
    tx: SyncSender<Command>,
}

impl StorageAdmin {
    pub(crate) fn new(tx: SyncSender<Command>) -> Self {
        Self { tx }
    }

    /// Ask the worker to finish queued requests and stop.
    pub fn shutdown(&self) -> Result<(), StorageError> {
        self.tx
            .send(Command::Shutdown)
            .map_err(|_| StorageError::ChannelSend)
    }
}
