//! Storage-specific error types.
//!
//! All storage operations return [`StorageError`] on failure. Callers use
//! [`StorageError::is_fatal`] to tell a broken storage engine apart from a
//! single rejected command.

use std::path::PathBuf;

use thiserror::Error;

use crate::storage::RrdCommand;

/// Errors that can occur in the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The storage engine binary could not be started.
    #[error(
        "unable to start \"{binary}\": {source}. Make sure RRDtool is installed and you have permissions to use it"
    )]
    ProcessSpawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The storage directory cannot be created or written to.
    #[error("unable to use directory '{path}': {reason}")]
    DirectoryAccess { path: PathBuf, reason: String },

    /// The engine answered a command with something other than `OK`.
    #[error("RRDtool choked on command '{command}' using file '{path}'; it replied with: '{reply}'")]
    Command {
        command: RrdCommand,
        path: PathBuf,
        reply: String,
    },

    /// The engine closed its output before answering.
    #[error("storage subprocess closed its pipes before replying")]
    ChannelClosed,

    /// The engine closed its output in the middle of a reply.
    #[error("storage subprocess exited in the middle of a reply: '{0}'")]
    TruncatedReply(String),

    /// Pipe I/O failed.
    #[error("storage pipe error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to send a request to the storage worker.
    #[error("failed to send command to storage worker")]
    ChannelSend,

    /// Internal error (e.g., thread join failure).
    #[error("internal error: {0}")]
    Internal(String),
}

impl StorageError {
    /// Whether the storage engine itself is unusable, as opposed to one
    /// command having failed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ProcessSpawn { .. } | Self::DirectoryAccess { .. }
        )
    }
}
