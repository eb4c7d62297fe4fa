//! Ingress Layer
//!
//! Typed bus frames and the listener that receives them.

mod frame;
mod listener;

use thiserror::Error;

pub use frame::{Child, Element, Frame, ItemEntry};
pub use listener::IngressListener;

/// Errors raised while receiving frames.
#[derive(Debug, Error)]
pub enum IngressError {
    #[error("failed to bind ingress listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed frame: {0}")]
    Decode(#[from] serde_json::Error),
}
