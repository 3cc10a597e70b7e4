//! # runu: instance state CLI
//!
//! Reports and manages the on-disk lifecycle state of sandboxed instances,
//! with a `state` command that prints the OCI runtime state document.

mod commands;
mod logging;
mod output;

use std::process::ExitCode;

use clap::Parser;

use crate::commands::Cli;

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = logging::init(cli.log.as_deref(), cli.log_format) {
        eprintln!("runu: {e:#}");
        return ExitCode::FAILURE;
    }

    match commands::execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // Logged rather than printed so the message reaches the caller's
            // configured log destination (e.g. a containerd shim).
            tracing::error!(error = format!("{e:#}"), "command failed");
            ExitCode::FAILURE
        }
    }
}
