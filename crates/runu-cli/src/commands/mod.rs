//! CLI command definitions and dispatch.

pub mod create;
pub mod delete;
pub mod kill;
pub mod list;
pub mod state;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use runu_common::config::RuntimeConfig;
use runu_runtime::cancel::CancelToken;
use runu_runtime::probe::{self, ProcessProbe};
use runu_runtime::state::StateStore;

use crate::logging::LogFormat;

/// runu: query and manage the lifecycle state of sandboxed instances.
#[derive(Parser, Debug)]
#[command(name = "runu", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Root directory holding instance state.
    #[arg(
        long,
        global = true,
        env = "RUNU_ROOT",
        default_value = runu_common::constants::DEFAULT_ROOT_DIR
    )]
    pub root: PathBuf,

    /// Append logs to this file instead of stderr.
    #[arg(long, global = true)]
    pub log: Option<PathBuf>,

    /// Format of log records.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Milliseconds to wait for an instance lock before giving up.
    #[arg(long, global = true, default_value_t = 5000)]
    pub lock_timeout_ms: u64,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Output the state of an instance.
    State(state::StateArgs),
    /// List instances and their status.
    List(list::ListArgs),
    /// Record a new instance from a bundle.
    Create(create::CreateArgs),
    /// Send a signal to an instance's init process.
    Kill(kill::KillArgs),
    /// Delete an instance's state.
    Delete(delete::DeleteArgs),
}

/// What every command needs: the store and the process probe.
pub struct Context {
    /// Store rooted at `--root`.
    pub store: StateStore,
    /// Platform probe.
    pub probe: Box<dyn ProcessProbe>,
}

impl Context {
    fn new(cli: &Cli) -> anyhow::Result<Self> {
        let config = RuntimeConfig::new(&cli.root)
            .with_lock_timeout(Duration::from_millis(cli.lock_timeout_ms));

        let cancel = CancelToken::new();
        let handler_token = cancel.clone();
        ctrlc::set_handler(move || handler_token.cancel())
            .context("failed to set Ctrl+C handler")?;

        let span = tracing::info_span!("runu", root = %cli.root.display());
        let store = StateStore::open(config)?
            .with_span(span)
            .with_cancel(cancel);
        Ok(Self {
            store,
            probe: probe::detect_probe(),
        })
    }
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let ctx = Context::new(&cli)?;
    match cli.command {
        Command::State(args) => state::execute(&ctx, &args),
        Command::List(args) => list::execute(&ctx, &args),
        Command::Create(args) => create::execute(&ctx, args),
        Command::Kill(args) => kill::execute(&ctx, &args),
        Command::Delete(args) => delete::execute(&ctx, &args),
    }
}

/// Parses a positional instance ID.
fn parse_id(raw: &str) -> anyhow::Result<runu_common::types::InstanceId> {
    Ok(runu_common::types::InstanceId::new(raw)?)
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn state_takes_root_and_one_id() {
        let cli =
            Cli::try_parse_from(["runu", "--root", "/tmp/r", "state", "my-unikernel"]).unwrap();
        assert_eq!(cli.root, PathBuf::from("/tmp/r"));
        assert!(matches!(cli.command, Command::State(ref a) if a.id == "my-unikernel"));
    }

    #[test]
    fn state_requires_an_id() {
        assert!(Cli::try_parse_from(["runu", "state"]).is_err());
        assert!(Cli::try_parse_from(["runu", "state", "a", "b"]).is_err());
    }

    #[test]
    fn parse_id_rejects_paths() {
        assert!(parse_id("../etc").is_err());
        assert!(parse_id("web-1").is_ok());
    }
}
