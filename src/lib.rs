//! gonc Library
//!
//! A minimal netcat-style relay. In connector mode it dials one peer and
//! relays local input and output with it; in listener mode it accepts many
//! peers, broadcasts local input to all of them and relays each peer to local
//! output.

pub mod config;
pub mod connection;
pub mod controller;
pub mod error;
pub mod relay;
pub mod shutdown;
pub mod transport;

pub use config::{Mode, RelayConfig};
pub use connection::{ConnectionRegistry, PeerHandle};
pub use controller::{CompletionPolicy, Connector, Listener};
pub use error::RelayError;
pub use shutdown::{ShutdownCoordinator, ShutdownEvent};
pub use transport::{Acceptor, Transport};

/// Result type for configuration and top-level plumbing
pub type Result<T> = anyhow::Result<T>;
