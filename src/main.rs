//! gonc - read and write data across networks
//!
//! Connects to `ADDR`, or listens on it with `-l`, and relays bytes between
//! the network and standard input/output. Diagnostics go to standard error.

use std::process;

use anyhow::{Context, Result};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gonc::config::{self, Mode, RelayConfig};
use gonc::{Connector, Listener, RelayError, ShutdownCoordinator, ShutdownEvent};

#[tokio::main]
async fn main() {
    let args = match config::parse_args(std::env::args_os()) {
        Ok(args) => args,
        Err(e) => e.exit(),
    };

    if args.single_addr().is_none() {
        eprint!("{}", config::usage());
        process::exit(1);
    }

    let config = match RelayConfig::from_cli(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("gonc: {:#}", e);
            process::exit(1);
        }
    };

    if let Err(e) = init_tracing(&config) {
        eprintln!("gonc: {:#}", e);
        process::exit(1);
    }

    // Outstanding relay tasks (and the blocking stdin reader) are ended by
    // exiting here rather than by dropping the runtime.
    match run(config).await {
        Ok(event) => {
            debug!("Exiting on {:?}", event);
            process::exit(event.exit_code());
        }
        Err(e) => {
            eprintln!("gonc: {:#}", e);
            process::exit(ShutdownEvent::Fatal.exit_code());
        }
    }
}

/// Run the selected controller until it or an interrupt ends the process
async fn run(config: RelayConfig) -> Result<ShutdownEvent> {
    let coordinator = ShutdownCoordinator::new();

    let controller = async {
        match config.mode {
            Mode::Listen => {
                let listener = Listener::bind(config.transport, &config.addr).await?;
                listener
                    .with_shutdown(coordinator.clone())
                    .serve(tokio::io::stdin(), tokio::io::stdout())
                    .await
            }
            Mode::Connect => {
                let outcome = Connector::new(config.transport, config.addr.as_str())
                    .with_policy(config.completion)
                    .with_shutdown(coordinator.clone())
                    .run(tokio::io::stdin(), tokio::io::stdout())
                    .await?;
                Ok::<_, RelayError>(outcome.event())
            }
        }
    };

    tokio::select! {
        result = controller => Ok(result?),
        signal = coordinator.listen_for_signals() => {
            signal.context("Failed to install signal handlers")
        }
    }
}

/// Initialize tracing/logging on stderr; stdout carries relayed data
fn init_tracing(config: &RelayConfig) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&config.log_level))
        .context("Invalid log level")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(true)
                .with_level(true),
        )
        .with(env_filter)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(())
}
