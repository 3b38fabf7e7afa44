//! Data Relay Module
//!
//! Copies bytes between a network connection and the local streams.

pub mod engine;
pub mod report;

pub use engine::{relay, ChunkSink, SharedOutput, WriterSink, READ_CHUNK_SIZE};
pub use report::{Direction, RelayReport};
