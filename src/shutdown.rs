//! Process Shutdown Events
//!
//! A controller finishing is a process-level event, separate from any single
//! relay task failing. Controllers return a [`ShutdownEvent`] and publish it
//! on a [`ShutdownCoordinator`] so that other parts of the program (and
//! tests) can observe that the whole program is about to exit.

use tokio::signal;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::relay::Direction;

/// Why the program is terminating
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownEvent {
    /// Local input reached EOF in listener mode
    InputClosed,
    /// The first relay direction of a connector session finished
    SessionClosed(Direction),
    /// A fatal error ended the controller
    Fatal,
    /// The process received an interrupt signal
    Interrupted,
}

impl ShutdownEvent {
    /// Process exit code for this event
    pub fn exit_code(&self) -> i32 {
        match self {
            ShutdownEvent::InputClosed | ShutdownEvent::SessionClosed(_) => 0,
            ShutdownEvent::Fatal => 1,
            ShutdownEvent::Interrupted => 130,
        }
    }
}

/// Broadcasts the shutdown event to every subscriber
#[derive(Debug, Clone)]
pub struct ShutdownCoordinator {
    shutdown_tx: broadcast::Sender<ShutdownEvent>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(4);
        Self { shutdown_tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownEvent> {
        self.shutdown_tx.subscribe()
    }

    /// Publish the event. Having no subscribers is not an error.
    pub fn announce(&self, event: ShutdownEvent) {
        match self.shutdown_tx.send(event) {
            Ok(receivers) => debug!("Announced {:?} to {} subscribers", event, receivers),
            Err(_) => debug!("Announced {:?} with no subscribers", event),
        }
    }

    /// Wait for Ctrl+C (or SIGTERM on unix) and announce it
    pub async fn listen_for_signals(&self) -> std::io::Result<ShutdownEvent> {
        #[cfg(unix)]
        {
            let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                result = signal::ctrl_c() => {
                    result?;
                    info!("Received Ctrl+C, shutting down");
                }
            }
        }

        #[cfg(not(unix))]
        {
            signal::ctrl_c().await?;
            info!("Received Ctrl+C, shutting down");
        }

        self.announce(ShutdownEvent::Interrupted);
        Ok(ShutdownEvent::Interrupted)
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
