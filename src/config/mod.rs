//! Configuration Module
//!
//! Command-line parsing and the validated configuration derived from it.

pub mod cli;
pub mod types;

pub use cli::{normalize_args, parse_args, usage, CliArgs};
pub use types::*;
