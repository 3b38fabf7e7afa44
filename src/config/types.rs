//! Configuration Types

use anyhow::{bail, Context};

use super::cli::CliArgs;
use crate::controller::CompletionPolicy;
use crate::transport::Transport;
use crate::Result;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

/// Operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Dial one peer
    #[default]
    Connect,
    /// Accept many peers
    Listen,
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub transport: Transport,
    pub mode: Mode,
    pub addr: String,
    pub completion: CompletionPolicy,
    pub log_level: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            transport: Transport::default(),
            mode: Mode::default(),
            addr: String::new(),
            completion: CompletionPolicy::default(),
            log_level: "warn".to_string(),
        }
    }
}

impl RelayConfig {
    /// Build the configuration from parsed arguments.
    ///
    /// The caller checks the positional count first, since misuse there is
    /// reported with usage text rather than as an error.
    pub fn from_cli(args: &CliArgs) -> Result<Self> {
        let addr = args
            .single_addr()
            .context("exactly one ADDR argument is required")?
            .to_string();
        let transport = args
            .proto
            .parse::<Transport>()
            .with_context(|| format!("Invalid -proto value: {}", args.proto))?;

        let config = Self {
            transport,
            mode: if args.listen { Mode::Listen } else { Mode::Connect },
            addr,
            completion: if args.drain {
                CompletionPolicy::BothDirections
            } else {
                CompletionPolicy::FirstDirection
            },
            log_level: if args.verbose {
                "debug".to_string()
            } else {
                args.log_level.to_ascii_lowercase()
            },
        };

        config.validate().context("Configuration validation failed")?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.addr.trim().is_empty() {
            bail!("ADDR must not be empty");
        }

        if self.mode == Mode::Listen && !self.transport.is_stream() {
            bail!(
                "{} is connectionless and cannot be used with -l",
                self.transport
            );
        }

        if self.mode == Mode::Listen && self.completion == CompletionPolicy::BothDirections {
            bail!("--drain only applies when connecting");
        }

        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            bail!(
                "log level must be one of {}, got {}",
                LOG_LEVELS.join(", "),
                self.log_level
            );
        }

        Ok(())
    }
}
