//! Binary crate for the `weather-etl` command-line tool.
//!
//! This crate focuses on:
//! - Parsing CLI arguments
//! - Logging setup
//! - Interactive configuration

use clap::Parser;
use std::process::ExitCode;

mod cli;
mod logging;

// Logging is installed as a thread-local default, so everything must run on
// this thread.
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    let cmd = cli::Cli::parse();
    cmd.run().await
}
