use std::io::IsTerminal;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::anyhow;
use clap::{ArgAction, Parser};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// One `key=value` setting from the command line. A leading `rc.` is
/// accepted and dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RcOverride {
    pub key: String,
    pub value: String,
}

impl FromStr for RcOverride {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (key, value) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        let key = key.trim();
        let key = key.strip_prefix("rc.").unwrap_or(key);
        if key.is_empty() {
            return Err(anyhow!("missing setting name in: {s}"));
        }

        Ok(Self {
            key: key.to_string(),
            value: value.trim().to_string(),
        })
    }
}

/// Positional overrides must spell out the `rc.` prefix so stray words are
/// rejected instead of silently becoming settings.
fn positional_override(s: &str) -> anyhow::Result<RcOverride> {
    if !s.starts_with("rc.") {
        return Err(anyhow!("unexpected argument {s} (settings look like rc.KEY=VALUE)"));
    }
    s.parse()
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "checklist",
    version,
    about = "Checklist: an in-memory todo list shell",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count)]
    pub quiet: u8,

    /// Override a setting, e.g. `--rc confirm=off`.
    #[arg(long = "rc", value_name = "KEY=VALUE", action = ArgAction::Append)]
    pub rc: Vec<RcOverride>,

    #[arg(long = "rcfile")]
    pub rcfile: Option<PathBuf>,

    /// Read shell commands from FILE instead of stdin.
    #[arg(long = "script", value_name = "FILE")]
    pub script: Option<PathBuf>,

    /// Settings given as `rc.KEY=VALUE`.
    #[arg(value_name = "rc.KEY=VALUE", value_parser = positional_override)]
    pub positional_rc: Vec<RcOverride>,
}

impl GlobalCli {
    /// Positional settings first, then `--rc` flags, so a flag wins.
    pub fn overrides(&self) -> impl Iterator<Item = (String, String)> + '_ {
        self.positional_rc
            .iter()
            .chain(&self.rc)
            .map(|kv| (kv.key.clone(), kv.value.clone()))
    }
}

/// Default filter directive for the `-v` / `-q` counts. `RUST_LOG` wins
/// when set.
pub fn log_level(verbose: u8, quiet: u8) -> &'static str {
    match (quiet, verbose) {
        (2.., _) => "error",
        (1, _) => "warn",
        (0, 0) => "warn",
        (0, 1) => "info",
        (0, 2) => "debug",
        (0, _) => "trace",
    }
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let level = log_level(verbose, quiet);
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level).map_err(|e| anyhow!("invalid log filter: {e}"))?,
    };

    let stderr = std::io::stderr();
    if let Err(err) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_ansi(stderr.is_terminal())
        .try_init()
    {
        debug!(error = %err, "tracing subscriber already set");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{GlobalCli, log_level};

    #[test]
    fn positional_and_flag_overrides_merge_in_order() {
        let cli = GlobalCli::try_parse_from([
            "checklist",
            "rc.default.sort=oldest",
            "-v",
            "--rc",
            "rc.color=off",
            "--rc",
            "confirm = no",
        ])
        .expect("parse");

        assert_eq!(cli.verbose, 1);
        let overrides: Vec<(String, String)> = cli.overrides().collect();
        assert_eq!(
            overrides,
            vec![
                ("default.sort".to_string(), "oldest".to_string()),
                ("color".to_string(), "off".to_string()),
                ("confirm".to_string(), "no".to_string()),
            ]
        );
    }

    #[test]
    fn malformed_overrides_are_rejected() {
        assert!(GlobalCli::try_parse_from(["checklist", "--rc", "confirm"]).is_err());
        assert!(GlobalCli::try_parse_from(["checklist", "--rc", "=off"]).is_err());
        assert!(GlobalCli::try_parse_from(["checklist", "color=off"]).is_err());
        assert!(GlobalCli::try_parse_from(["checklist", "rc.color"]).is_err());
    }

    #[test]
    fn quiet_beats_verbose() {
        assert_eq!(log_level(0, 0), "warn");
        assert_eq!(log_level(2, 0), "debug");
        assert_eq!(log_level(5, 0), "trace");
        assert_eq!(log_level(3, 1), "warn");
        assert_eq!(log_level(0, 2), "error");
    }
}
