//! Storage Layer
//!
//! RRDtool persistence through a supervised `rrdtool -` subprocess:
//! - **Channel**: the line protocol and subprocess lifecycle
//! - **Worker**: one thread owning the channel, fed by an MPSC queue
//!
//! # Components
//!
//! - [`StorageChannel`]: `create`/`update` commands, reply framing, respawn on exit
//! - [`StorageWriter`]: queue store requests for the worker
//! - [`StorageAdmin`]: worker shutdown
//! - [`StorageBuilder`] / [`StorageHandles`]: initialization and lifecycle management

mod actor;
mod builder;
mod channel;
mod command;
mod error;
mod facades;
mod path;

pub(crate) use actor::Command;
pub use actor::{StoreOutcome, StoreRequest};
pub use builder::{DEFAULT_CHANNEL_CAPACITY, DEFAULT_RRD_BIN, StorageBuilder, StorageHandles};
pub use channel::StorageChannel;
pub use command::{
    CREATE_START_OFFSET, DS_NAME_MAX_LEN, Reply, RrdCommand, create_args, ds_name, read_reply,
    update_args,
};
pub use error::StorageError;
pub use facades::{StorageAdmin, StorageWriter};
pub use path::{escape, storage_path};
