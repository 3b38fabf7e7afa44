//! Relay Reports

use std::fmt;
use std::io;
use std::time::Duration;

use tracing::{info, warn};

/// Which way a relay task moves bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Local input to the peer
    Input,
    /// The peer to local output
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => f.write_str("input"),
            Direction::Output => f.write_str("output"),
        }
    }
}

/// Outcome of one relay task, produced once its source reaches EOF or an
/// I/O error ends the copy.
#[derive(Debug)]
pub struct RelayReport {
    pub direction: Direction,
    pub peer: String,
    pub bytes: u64,
    pub elapsed: Duration,
    pub error: Option<io::Error>,
}

impl RelayReport {
    pub fn new(
        direction: Direction,
        peer: impl Into<String>,
        bytes: u64,
        elapsed: Duration,
        error: Option<io::Error>,
    ) -> Self {
        Self {
            direction,
            peer: peer.into(),
            bytes,
            elapsed,
            error,
        }
    }

    /// True when the relay ended on EOF rather than an error
    pub fn is_clean(&self) -> bool {
        self.error.is_none()
    }

    /// Log the outcome once: `info` on EOF, `warn` when an error ended the copy
    pub fn log(&self) {
        match &self.error {
            None => {
                info!(
                    direction = %self.direction,
                    peer = %self.peer,
                    bytes = self.bytes,
                    elapsed_ms = self.elapsed.as_millis(),
                    "Relay finished at EOF"
                );
            }
            Some(e) => {
                warn!(
                    direction = %self.direction,
                    peer = %self.peer,
                    bytes = self.bytes,
                    elapsed_ms = self.elapsed.as_millis(),
                    "Relay stopped: {}", e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct CapturedLog(Arc<Mutex<Vec<u8>>>);

    impl io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn log_lines(report: &RelayReport) -> Vec<String> {
        let captured = CapturedLog::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || report.log());

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        output.lines().map(str::to_string).collect()
    }

    #[test]
    fn test_report_cleanliness() {
        let clean = RelayReport::new(Direction::Input, "peer", 3, Duration::ZERO, None);
        assert!(clean.is_clean());

        let failed = RelayReport::new(
            Direction::Output,
            "peer",
            0,
            Duration::ZERO,
            Some(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
        );
        assert!(!failed.is_clean());
        assert_eq!(failed.direction.to_string(), "output");
    }

    #[test]
    fn test_log_writes_one_line_per_outcome() {
        let clean = RelayReport::new(Direction::Input, "10.0.0.1:80", 3, Duration::ZERO, None);
        let lines = log_lines(&clean);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("INFO"));
        assert!(lines[0].contains("bytes=3"));

        let failed = RelayReport::new(
            Direction::Output,
            "10.0.0.1:80",
            0,
            Duration::ZERO,
            Some(io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer")),
        );
        let lines = log_lines(&failed);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("WARN"));
        assert!(lines[0].contains("reset by peer"));
    }
}
