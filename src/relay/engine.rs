//! Relay Engine
//!
//! The single copy loop both controllers are built from: read a chunk from a
//! source, hand it to a sink, repeat until EOF or an I/O error.

use std::io;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use super::report::{Direction, RelayReport};
use crate::transport::BoxedWriter;

/// Size of every read from a relay source or from local input
pub const READ_CHUNK_SIZE: usize = 32 * 1024;

/// Destination for relayed chunks.
///
/// A chunk is delivered whole (written and flushed) before the next one is
/// read, so output from concurrent relays never interleaves mid-chunk.
#[async_trait]
pub trait ChunkSink: Send {
    async fn deliver(&mut self, chunk: &[u8]) -> io::Result<()>;
}

/// Sink that owns its writer outright
#[derive(Debug)]
pub struct WriterSink<W> {
    writer: W,
}

impl<W> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W> ChunkSink for WriterSink<W>
where
    W: AsyncWrite + Send + Unpin,
{
    async fn deliver(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.writer.write_all(chunk).await?;
        self.writer.flush().await
    }
}

/// Local output shared by many relay tasks
#[derive(Clone)]
pub struct SharedOutput {
    inner: Arc<Mutex<BoxedWriter>>,
}

impl SharedOutput {
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            inner: Arc::new(Mutex::new(Box::new(writer))),
        }
    }
}

#[async_trait]
impl ChunkSink for SharedOutput {
    async fn deliver(&mut self, chunk: &[u8]) -> io::Result<()> {
        let mut writer = self.inner.lock().await;
        writer.write_all(chunk).await?;
        writer.flush().await
    }
}

/// Copy `source` into `sink` until EOF or an I/O error on either side.
///
/// EOF ends the relay cleanly; any other error is recorded in the returned
/// report. The relay never retries.
pub async fn relay<R, S>(
    direction: Direction,
    peer: &str,
    source: &mut R,
    sink: &mut S,
) -> RelayReport
where
    R: AsyncRead + Unpin + ?Sized,
    S: ChunkSink + ?Sized,
{
    let started = Instant::now();
    let mut buf = BytesMut::with_capacity(READ_CHUNK_SIZE);
    let mut bytes = 0u64;

    let error = loop {
        buf.clear();
        match source.read_buf(&mut buf).await {
            Ok(0) => break None,
            Ok(n) => {
                if let Err(e) = sink.deliver(&buf[..n]).await {
                    break Some(e);
                }
                bytes += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => break Some(e),
        }
    };

    RelayReport::new(direction, peer, bytes, started.elapsed(), error)
}
