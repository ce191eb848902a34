//!
//! # Fill21 CLI
//!
//! Layout density analysis, and dummy-fill insertion and removal, for GDSII files.
//!

use clap::Parser;
use std::error::Error;
use tracing_subscriber::EnvFilter;

// Use our own crate, note by name, not `crate::` or `super::`.
use fill21::cli::{ProgramOptions, _main};

/// Log to stderr, at a level set by `RUST_LOG` if defined, or else by the verbosity count
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

/// Main entry point.
/// Parses the command-line arguments and calls [`_main`].
pub fn main() -> Result<(), Box<dyn Error>> {
    let options = ProgramOptions::parse();
    init_logging(options.verbose);
    _main(&options)?;
    Ok(())
}
