//! Connector Controller
//!
//! Dials one peer and relays in both directions: local input to the peer and
//! the peer to local output.

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::error::RelayError;
use crate::relay::{relay, Direction, RelayReport, WriterSink};
use crate::shutdown::{ShutdownCoordinator, ShutdownEvent};
use crate::transport::{Connection, Transport};

/// When the connector considers a session finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionPolicy {
    /// Return as soon as either direction finishes. Bytes still in flight
    /// from the peer may never reach local output.
    #[default]
    FirstDirection,
    /// Wait for both directions. The write side is shut down once local
    /// input ends so the peer sees EOF.
    BothDirections,
}

/// Result of a connector session
#[derive(Debug)]
pub struct ConnectorOutcome {
    pub peer: String,
    /// Relay reports in completion order
    pub reports: Vec<RelayReport>,
}

impl ConnectorOutcome {
    /// The direction that finished first
    pub fn first(&self) -> Option<&RelayReport> {
        self.reports.first()
    }

    pub fn event(&self) -> ShutdownEvent {
        match self.first() {
            Some(report) => ShutdownEvent::SessionClosed(report.direction),
            None => ShutdownEvent::Fatal,
        }
    }
}

/// Connector mode controller: `Dialing -> Relaying -> Done`
#[derive(Debug, Clone)]
pub struct Connector {
    transport: Transport,
    addr: String,
    policy: CompletionPolicy,
    shutdown: Option<ShutdownCoordinator>,
}

impl Connector {
    pub fn new(transport: Transport, addr: impl Into<String>) -> Self {
        Self {
            transport,
            addr: addr.into(),
            policy: CompletionPolicy::default(),
            shutdown: None,
        }
    }

    pub fn with_policy(mut self, policy: CompletionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Publish the terminating event on `coordinator` when the session ends
    pub fn with_shutdown(mut self, coordinator: ShutdownCoordinator) -> Self {
        self.shutdown = Some(coordinator);
        self
    }

    /// Dial the peer and relay until the completion policy is satisfied.
    ///
    /// Relay tasks still running when this returns are left to the process
    /// exit.
    pub async fn run<I, O>(self, input: I, output: O) -> Result<ConnectorOutcome, RelayError>
    where
        I: AsyncRead + Send + Unpin + 'static,
        O: AsyncWrite + Send + Unpin + 'static,
    {
        let connection = match self.transport.dial(&self.addr).await {
            Ok(connection) => connection,
            Err(e) => {
                error!("Dial failed: {}", e);
                self.announce(ShutdownEvent::Fatal);
                return Err(e);
            }
        };
        let outcome = self.relay_session(connection, input, output).await;
        self.announce(outcome.event());
        Ok(outcome)
    }

    /// Run both relay directions over an established connection.
    pub async fn relay_session<I, O>(
        &self,
        connection: Connection,
        mut input: I,
        output: O,
    ) -> ConnectorOutcome
    where
        I: AsyncRead + Send + Unpin + 'static,
        O: AsyncWrite + Send + Unpin + 'static,
    {
        let Connection {
            peer,
            mut reader,
            writer,
        } = connection;
        info!("Relaying with {}", peer);

        // One slot: the first finisher is received, a second sender waits
        // until it is received or the receiver is gone.
        let (done_tx, mut done_rx) = mpsc::channel::<RelayReport>(1);
        let policy = self.policy;

        let input_done = done_tx.clone();
        let input_peer = peer.clone();
        tokio::spawn(async move {
            let mut sink = WriterSink::new(writer);
            let report = relay(Direction::Input, &input_peer, &mut input, &mut sink).await;
            report.log();
            if policy == CompletionPolicy::BothDirections {
                if let Err(e) = sink.get_mut().shutdown().await {
                    debug!("Failed to shut down write side: {}", e);
                }
            }
            let _ = input_done.send(report).await;
        });

        let output_done = done_tx;
        let output_peer = peer.clone();
        tokio::spawn(async move {
            let mut sink = WriterSink::new(output);
            let report = relay(Direction::Output, &output_peer, &mut reader, &mut sink).await;
            report.log();
            let _ = output_done.send(report).await;
        });

        let wanted = match policy {
            CompletionPolicy::FirstDirection => 1,
            CompletionPolicy::BothDirections => 2,
        };
        let mut reports = Vec::with_capacity(wanted);
        while reports.len() < wanted {
            match done_rx.recv().await {
                Some(report) => {
                    debug!("Relay {} finished", report.direction);
                    reports.push(report);
                }
                // Both tasks are gone without reporting.
                None => break,
            }
        }

        ConnectorOutcome { peer, reports }
    }

    fn announce(&self, event: ShutdownEvent) {
        if let Some(coordinator) = &self.shutdown {
            coordinator.announce(event);
        }
    }
}
