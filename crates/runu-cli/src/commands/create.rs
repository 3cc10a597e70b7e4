//! `runu create`: Record a new instance from a bundle.

use std::path::PathBuf;

use anyhow::Context as _;
use clap::Args;
use runu_common::constants::BUNDLE_LABEL;
use runu_runtime::record::InstanceRecord;

use super::Context;

/// Arguments for the `create` command.
#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Instance ID.
    pub id: String,

    /// Path to the bundle directory.
    #[arg(short, long)]
    pub bundle: PathBuf,

    /// Root filesystem; defaults to `<bundle>/rootfs`.
    #[arg(long)]
    pub rootfs: Option<PathBuf>,

    /// Label attached to the instance, as `key=value`. Repeatable.
    #[arg(short, long = "label", value_parser = parse_label)]
    pub labels: Vec<(String, String)>,
}

/// Executes the `create` command.
///
/// Writes a `created` record; starting the init process is the sandbox
/// engine's job.
///
/// # Errors
///
/// Returns an error if the ID is invalid or taken, or the record cannot be
/// written.
pub fn execute(ctx: &Context, args: CreateArgs) -> anyhow::Result<()> {
    let id = super::parse_id(&args.id)?;
    let bundle = std::path::absolute(&args.bundle)
        .with_context(|| format!("resolving bundle path {}", args.bundle.display()))?;
    let rootfs = match args.rootfs {
        Some(rootfs) => std::path::absolute(&rootfs)
            .with_context(|| format!("resolving rootfs path {}", rootfs.display()))?,
        None => bundle.join("rootfs"),
    };

    let mut labels = args.labels;
    labels.push((BUNDLE_LABEL.to_owned(), bundle.to_string_lossy().into_owned()));

    let mut record = InstanceRecord::new(id.clone(), bundle, rootfs)?.with_labels(labels);
    record.mark_created()?;
    ctx.store
        .create(&record)
        .with_context(|| format!("creating instance {id}"))?;
    tracing::info!(id = %id, "instance created");
    Ok(())
}

fn parse_label(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_owned(), value.to_owned())),
        _ => Err(format!("label {raw:?} is not of the form key=value")),
    }
}
