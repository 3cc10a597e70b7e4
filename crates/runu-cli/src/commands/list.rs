//! `runu list`: List instances with their resolved status.

use std::io::Write;

use anyhow::Context as _;
use clap::{Args, ValueEnum};
use runu_common::error::RunuError;
use runu_runtime::{report, status};

use super::Context;
use crate::output;

/// Output format of the `list` command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ListFormat {
    /// Aligned columns.
    #[default]
    Table,
    /// JSON array of state documents.
    Json,
}

/// Arguments for the `list` command.
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Output format.
    #[arg(short, long, value_enum, default_value_t = ListFormat::Table)]
    pub format: ListFormat,
}

/// Executes the `list` command.
///
/// # Errors
///
/// Returns an error if the root directory cannot be read or an instance
/// cannot be resolved.
pub fn execute(ctx: &Context, args: &ListArgs) -> anyhow::Result<()> {
    let mut states = Vec::new();
    for record in ctx.store.list().context("listing instances")? {
        match status::resolve_and_repair(&ctx.store, record.id(), ctx.probe.as_ref()) {
            Ok((record, status)) => states.push(report::report(&record, status)),
            // Deleted since the directory was read.
            Err(RunuError::NotFound { .. }) => {}
            Err(e) => {
                return Err(e).with_context(|| format!("resolving instance {}", record.id()));
            }
        }
    }

    let rendered = match args.format {
        ListFormat::Table => output::status_table(&states).into_bytes(),
        ListFormat::Json => serde_json::to_vec_pretty(&states).context("serializing instances")?,
    };
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&rendered).context("writing instance list")?;
    Ok(())
}
