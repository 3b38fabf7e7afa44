//! Command-line arguments

use std::ffi::OsString;

use clap::{CommandFactory, Parser};

/// Long flags that may also be written with a single dash (`-proto tcp`)
const SINGLE_DASH_LONG_FLAGS: &[&str] = &["proto", "drain", "verbose", "log-level", "help"];

/// Flags whose value may be given as the following argument
const VALUE_FLAGS: &[&str] = &["proto", "log-level"];

/// Boolean flags that also accept an explicit `=<bool>` value (`-l=true`)
const BOOL_FLAGS: &[&str] = &["l", "v", "verbose", "drain"];

#[derive(Parser, Debug)]
#[command(name = "gonc")]
#[command(about = "Read and write data across networks.")]
#[command(version)]
#[command(override_usage = "gonc [OPTION]... ADDR")]
#[command(after_help = "\
Examples:
  Connect to example.org on TCP port 8080.
    gonc example.org:8080
  Listen for connections on TCP port 8080.
    gonc -l :8080
  Listen for connections on localhost at TCP port 8080.
    gonc -l 127.0.0.1:8080")]
pub struct CliArgs {
    /// Transfer protocol (tcp, tcp4, tcp6, udp, udp4, udp6, unix)
    #[arg(long, default_value = "tcp", value_name = "PROTO")]
    pub proto: String,

    /// Listen for incoming connections
    #[arg(short = 'l')]
    pub listen: bool,

    /// When connecting, wait for both directions to finish before exiting
    #[arg(long)]
    pub drain: bool,

    /// Enable verbose logging (sets log level to debug)
    #[arg(short, long)]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off); RUST_LOG takes precedence
    #[arg(long, default_value = "warn")]
    pub log_level: String,

    /// Address to connect to or listen on
    #[arg(value_name = "ADDR")]
    pub addrs: Vec<String>,
}

impl CliArgs {
    /// The positional address, if exactly one was given
    pub fn single_addr(&self) -> Option<&str> {
        match self.addrs.as_slice() {
            [addr] => Some(addr.as_str()),
            _ => None,
        }
    }
}

/// Rewrite arguments into the form clap expects:
///
/// - single-dash long flags (`-proto`, `-proto=udp`) get a second dash;
/// - boolean flags with an explicit value (`-l=true`, `--drain=false`) become
///   the bare flag or are dropped;
/// - flag parsing stops at the first positional argument, so everything from
///   there on is passed through after a `--`.
pub fn normalize_args<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut normalized = Vec::new();
    let mut passthrough = false;
    let mut expects_value = false;

    for (index, arg) in args.into_iter().enumerate() {
        let arg: OsString = arg.into();
        if index == 0 || passthrough {
            normalized.push(arg);
            continue;
        }
        if expects_value {
            expects_value = false;
            normalized.push(arg);
            continue;
        }

        let Some(text) = arg.to_str() else {
            passthrough = true;
            normalized.push(OsString::from("--"));
            normalized.push(arg);
            continue;
        };

        if text == "--" {
            passthrough = true;
            normalized.push(arg);
            continue;
        }

        let flag = match text.strip_prefix("--").or_else(|| text.strip_prefix('-')) {
            Some(flag) if !flag.is_empty() => flag,
            _ => {
                // First positional argument (a lone `-` counts as one)
                passthrough = true;
                normalized.push(OsString::from("--"));
                normalized.push(arg);
                continue;
            }
        };

        let (name, value) = match flag.split_once('=') {
            Some((name, value)) => (name, Some(value)),
            None => (flag, None),
        };
        let dashes = if name.len() == 1 { "-" } else { "--" };

        if let Some(enabled) = value
            .filter(|_| BOOL_FLAGS.contains(&name))
            .and_then(parse_bool)
        {
            if enabled {
                normalized.push(OsString::from(format!("{}{}", dashes, name)));
            }
            continue;
        }

        expects_value = value.is_none() && VALUE_FLAGS.contains(&name);
        if SINGLE_DASH_LONG_FLAGS.contains(&name) {
            normalized.push(OsString::from(format!("--{}", flag)));
        } else {
            normalized.push(arg);
        }
    }

    normalized
}

/// Boolean spellings accepted for `-flag=<bool>`
fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

/// Parse process arguments, accepting both flag spellings
pub fn parse_args<I, T>(args: I) -> Result<CliArgs, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    CliArgs::try_parse_from(normalize_args(args))
}

/// Usage text written to stderr on argument misuse
pub fn usage() -> String {
    CliArgs::command().render_help().to_string()
}
