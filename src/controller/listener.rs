//! Listener Controller
//!
//! Accepts any number of peers. Local input is broadcast to every registered
//! peer; each peer's bytes are relayed to local output.

use std::io;
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tracing::{debug, error, info, instrument, warn};

use crate::connection::{ConnectionRegistry, PeerHandle};
use crate::error::RelayError;
use crate::relay::{relay, Direction, SharedOutput, READ_CHUNK_SIZE};
use crate::shutdown::{ShutdownCoordinator, ShutdownEvent};
use crate::transport::{Acceptor, BoxedReader, Transport, TransportListener};

/// Per-peer outcome of writing one chunk of local input
#[derive(Debug, Default)]
pub struct BroadcastReport {
    pub delivered: Vec<String>,
    pub failed: Vec<(String, io::Error)>,
}

impl BroadcastReport {
    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.failed.len()
    }
}

/// Write `chunk` to every peer in a snapshot of the registry, one after the
/// other. A failing peer is logged and recorded; delivery to the rest of the
/// snapshot carries on.
pub async fn broadcast_chunk(registry: &ConnectionRegistry, chunk: &[u8]) -> BroadcastReport {
    let mut report = BroadcastReport::default();
    for peer in registry.snapshot() {
        match peer.write_chunk(chunk).await {
            Ok(()) => report.delivered.push(peer.addr().to_string()),
            Err(e) => {
                warn!(peer = %peer.addr(), "Failed to write to peer: {}", e);
                report.failed.push((peer.addr().to_string(), e));
            }
        }
    }
    report
}

/// Read local input in fixed-size chunks and broadcast each one until EOF.
///
/// EOF is the clean end of the listener; any other read error is fatal.
pub async fn broadcast_input<I>(
    mut input: I,
    registry: Arc<ConnectionRegistry>,
) -> Result<ShutdownEvent, RelayError>
where
    I: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(READ_CHUNK_SIZE);
    loop {
        buf.reserve(READ_CHUNK_SIZE);
        match input.read_buf(&mut (&mut buf).limit(READ_CHUNK_SIZE)).await {
            Ok(0) => {
                info!("Local input closed");
                return Ok(ShutdownEvent::InputClosed);
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(RelayError::Input(e)),
        }

        let chunk: Bytes = buf.split().freeze();
        let report = broadcast_chunk(&registry, &chunk).await;
        debug!(
            bytes = chunk.len(),
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "Broadcast chunk"
        );
    }
}

/// Relay one peer to local output, then drop it from the registry.
#[instrument(skip_all, fields(peer = %peer))]
async fn relay_peer_output(
    peer: String,
    mut reader: BoxedReader,
    mut output: SharedOutput,
    registry: Arc<ConnectionRegistry>,
) {
    let report = relay(Direction::Output, &peer, &mut reader, &mut output).await;
    report.log();
    registry.remove(&peer);
    info!("Peer {} disconnected", peer);
}

/// Listener mode controller: `Binding -> Serving -> Terminated`
pub struct Listener<A = TransportListener> {
    transport: Transport,
    acceptor: A,
    local_addr: String,
    registry: Arc<ConnectionRegistry>,
    shutdown: Option<ShutdownCoordinator>,
}

impl Listener {
    /// Bind `addr` under `transport`. Failure here is fatal.
    pub async fn bind(transport: Transport, addr: &str) -> Result<Self, RelayError> {
        let listener = transport.bind(addr).await?;
        Self::with_acceptor(transport, listener).map_err(|source| RelayError::Bind {
            transport,
            addr: addr.to_string(),
            source,
        })
    }
}

impl<A: Acceptor> Listener<A> {
    /// Serve peers from an already bound acceptor
    pub fn with_acceptor(transport: Transport, acceptor: A) -> io::Result<Self> {
        let local_addr = acceptor.local_addr()?;
        Ok(Self {
            transport,
            acceptor,
            local_addr,
            registry: Arc::new(ConnectionRegistry::new()),
            shutdown: None,
        })
    }

    /// Publish the terminating event on `coordinator` when serving ends
    pub fn with_shutdown(mut self, coordinator: ShutdownCoordinator) -> Self {
        self.shutdown = Some(coordinator);
        self
    }

    /// Address actually bound, useful when binding port 0
    pub fn local_addr(&self) -> &str {
        &self.local_addr
    }

    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Serve until local input ends or accepting fails.
    ///
    /// Peer relay tasks are not stopped when this returns; the caller is
    /// expected to exit the process.
    pub async fn serve<I, O>(mut self, input: I, output: O) -> Result<ShutdownEvent, RelayError>
    where
        I: AsyncRead + Send + Unpin + 'static,
        O: AsyncWrite + Send + Unpin + 'static,
    {
        info!("Serving {} on {}", self.transport, self.local_addr);
        let output = SharedOutput::new(output);
        let mut broadcaster = tokio::spawn(broadcast_input(input, self.registry()));

        let result = tokio::select! {
            joined = &mut broadcaster => match joined {
                Ok(result) => result,
                Err(e) => Err(RelayError::Task(e)),
            },
            err = self.accept_loop(output) => {
                broadcaster.abort();
                Err(err)
            }
        };

        let event = match &result {
            Ok(event) => *event,
            Err(e) => {
                error!("Listener terminated: {}", e);
                ShutdownEvent::Fatal
            }
        };
        if let Some(coordinator) = &self.shutdown {
            coordinator.announce(event);
        }
        result
    }

    /// Accept peers forever; only returns on accept failure.
    async fn accept_loop(&mut self, output: SharedOutput) -> RelayError {
        loop {
            let connection = match self.acceptor.accept().await {
                Ok(connection) => connection,
                Err(source) => {
                    return RelayError::Accept {
                        addr: self.local_addr.clone(),
                        source,
                    }
                }
            };

            let peer = connection.peer;
            self.registry
                .add(peer.clone(), PeerHandle::new(peer.clone(), connection.writer));
            info!("Accepted connection from {}", peer);

            tokio::spawn(relay_peer_output(
                peer,
                connection.reader,
                output.clone(),
                self.registry(),
            ));
        }
    }
}
