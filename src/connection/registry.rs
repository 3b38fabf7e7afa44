//! Connection Registry Implementation

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::transport::BoxedWriter;

/// Cloneable handle to the write side of a live peer connection.
///
/// The read side is owned by the peer's output-relay task; the write side is
/// shared here so that broadcasts can reach the peer. Writes are serialized by
/// an async mutex held for one chunk at a time.
#[derive(Clone)]
pub struct PeerHandle {
    addr: Arc<str>,
    writer: Arc<tokio::sync::Mutex<BoxedWriter>>,
}

impl PeerHandle {
    pub fn new<W>(addr: impl Into<String>, writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            addr: Arc::from(addr.into()),
            writer: Arc::new(tokio::sync::Mutex::new(Box::new(writer))),
        }
    }

    /// Remote address this peer was registered under
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Write one whole chunk to the peer and flush it
    pub async fn write_chunk(&self, chunk: &[u8]) -> io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(chunk).await?;
        writer.flush().await
    }

    /// Whether two handles refer to the same underlying connection
    pub fn same_connection(&self, other: &PeerHandle) -> bool {
        Arc::ptr_eq(&self.writer, &other.writer)
    }
}

impl fmt::Debug for PeerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerHandle").field("addr", &self.addr).finish()
    }
}

/// Thread-safe mapping from peer address to live connection.
///
/// Every operation takes the same lock for the duration of an O(1) map
/// operation (or an O(n) copy for [`snapshot`](Self::snapshot)) and never
/// holds it across I/O.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    peers: Mutex<HashMap<String, PeerHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave the map half-updated, so a
    // poisoned guard is still safe to use.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, PeerHandle>> {
        self.peers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a peer, silently replacing any entry with the same address.
    ///
    /// Returns the displaced handle, if there was one.
    pub fn add(&self, addr: impl Into<String>, peer: PeerHandle) -> Option<PeerHandle> {
        let addr = addr.into();
        let previous = self.lock().insert(addr.clone(), peer);
        if previous.is_some() {
            debug!(peer = %addr, "Replaced existing registry entry");
        }
        previous
    }

    /// Remove a peer. Removing an absent address is a no-op.
    ///
    /// Returns whether an entry was actually removed.
    pub fn remove(&self, addr: &str) -> bool {
        let removed = self.lock().remove(addr).is_some();
        if removed {
            debug!(peer = %addr, "Removed peer from registry");
        }
        removed
    }

    /// Point-in-time copy of every registered connection, in no particular order
    pub fn snapshot(&self) -> Vec<PeerHandle> {
        self.lock().values().cloned().collect()
    }

    /// Point-in-time copy of every registered address
    pub fn addresses(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn contains(&self, addr: &str) -> bool {
        self.lock().contains_key(addr)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
