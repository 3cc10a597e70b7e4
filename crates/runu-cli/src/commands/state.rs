//! `runu state`: Output the OCI state of an instance.

use std::io::Write;

use anyhow::Context as _;
use clap::Args;
use runu_runtime::report;

use super::Context;

/// Arguments for the `state` command.
#[derive(Args, Debug)]
pub struct StateArgs {
    /// Instance ID.
    pub id: String,
}

/// Executes the `state` command.
///
/// Resolves the instance's status (repairing a stale record on the way)
/// and writes the state document to stdout. Nothing is written on failure.
///
/// # Errors
///
/// Returns an error if the instance cannot be loaded, probed, or serialized.
pub fn execute(ctx: &Context, args: &StateArgs) -> anyhow::Result<()> {
    let id = super::parse_id(&args.id)?;
    let state = report::query(&ctx.store, &id, ctx.probe.as_ref())
        .with_context(|| format!("getting state of instance {id}"))?;
    let data = state
        .to_json()
        .context("serializing instance state")?;

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&data).context("writing state")?;
    stdout.flush().context("writing state")?;
    Ok(())
}
