//! Connection Registry Module
//!
//! Tracks the peers a listener currently considers live.

pub mod registry;

pub use registry::{ConnectionRegistry, PeerHandle};
