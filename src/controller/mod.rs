//! Mode Controllers
//!
//! Exactly one controller runs per process: the listener (`-l`) or the
//! connector (default).

pub mod connector;
pub mod listener;

pub use connector::{CompletionPolicy, Connector, ConnectorOutcome};
pub use listener::{broadcast_chunk, broadcast_input, BroadcastReport, Listener};
