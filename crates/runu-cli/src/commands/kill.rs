//! `runu kill`: Send a signal to an instance's init process.

use std::str::FromStr;

use anyhow::Context as _;
use clap::Args;
use nix::sys::signal::Signal;
use runu_runtime::control;

use super::Context;

/// Arguments for the `kill` command.
#[derive(Args, Debug)]
pub struct KillArgs {
    /// Instance ID.
    pub id: String,

    /// Signal name (`TERM`, `SIGKILL`) or number.
    #[arg(default_value = "SIGTERM", value_parser = parse_signal)]
    pub signal: Signal,
}

/// Executes the `kill` command.
///
/// # Errors
///
/// Returns an error if the instance is not running or the signal cannot
/// be delivered.
pub fn execute(ctx: &Context, args: &KillArgs) -> anyhow::Result<()> {
    let id = super::parse_id(&args.id)?;
    control::kill(&ctx.store, ctx.probe.as_ref(), &id, args.signal)
        .with_context(|| format!("signalling instance {id}"))
}

fn parse_signal(raw: &str) -> Result<Signal, String> {
    if let Ok(number) = raw.parse::<i32>() {
        return Signal::try_from(number).map_err(|_| format!("unknown signal number {number}"));
    }
    let upper = raw.to_ascii_uppercase();
    let name = if upper.starts_with("SIG") {
        upper
    } else {
        format!("SIG{upper}")
    };
    Signal::from_str(&name).map_err(|_| format!("unknown signal {raw:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_signal_accepts_names_and_numbers() {
        assert_eq!(parse_signal("TERM").unwrap(), Signal::SIGTERM);
        assert_eq!(parse_signal("sigkill").unwrap(), Signal::SIGKILL);
        assert_eq!(parse_signal("9").unwrap(), Signal::SIGKILL);
    }

    #[test]
    fn parse_signal_rejects_unknown() {
        assert!(parse_signal("NOPE").is_err());
        assert!(parse_signal("999").is_err());
    }
}
