//! `runu delete`: Delete an instance's state.

use anyhow::Context as _;
use clap::Args;
use runu_runtime::control;

use super::Context;

/// Arguments for the `delete` command.
#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Instance ID.
    pub id: String,

    /// Kill a still-running init process first.
    #[arg(short, long)]
    pub force: bool,
}

/// Executes the `delete` command.
///
/// # Errors
///
/// Returns an error if the instance does not exist or is still running
/// without `--force`.
pub fn execute(ctx: &Context, args: &DeleteArgs) -> anyhow::Result<()> {
    let id = super::parse_id(&args.id)?;
    control::delete(&ctx.store, ctx.probe.as_ref(), &id, args.force)
        .with_context(|| format!("deleting instance {id}"))
}
