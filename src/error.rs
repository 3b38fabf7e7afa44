//! Error types for gonc
//!
//! Fatal conditions (bind, accept, dial, local input) are distinct variants so
//! the binary can report them and exit, while per-peer relay failures are
//! carried in [`RelayReport`](crate::relay::RelayReport) values instead.

use std::io;

use thiserror::Error;

use crate::transport::Transport;

/// Top-level error type for the relay controllers
#[derive(Debug, Error)]
pub enum RelayError {
    /// The listening address could not be bound
    #[error("failed to listen on {transport} {addr}: {source}")]
    Bind {
        transport: Transport,
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The accept loop failed; the listener does not re-bind
    #[error("failed to accept connection on {addr}: {source}")]
    Accept {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The remote address could not be dialed
    #[error("failed to connect to {transport} {addr}: {source}")]
    Connect {
        transport: Transport,
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Reading local input failed with something other than EOF
    #[error("failed to read local input: {0}")]
    Input(#[source] io::Error),

    #[error("unsupported transport protocol {0:?}")]
    UnsupportedTransport(String),

    /// A controller task panicked or was cancelled
    #[error("relay task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
