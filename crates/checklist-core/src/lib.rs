pub mod cli;
pub mod commands;
pub mod config;
pub mod render;
pub mod store;
pub mod task;
pub mod view;

use std::ffi::OsString;
use std::fs;
use std::io::{self, BufReader, IsTerminal};

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info};

pub use store::{DeleteTarget, Intent, Outcome, PendingDeletion, Store};
pub use task::{Task, TaskId};
pub use view::{FilterMode, SortMode, VisibleTask};

#[tracing::instrument(skip_all)]
pub fn run(raw_args: Vec<OsString>) -> anyhow::Result<()> {
    let cli = cli::GlobalCli::parse_from(raw_args);

    cli::init_tracing(cli.verbose, cli.quiet)?;

    info!(
        verbose = cli.verbose,
        quiet = cli.quiet,
        "starting checklist shell"
    );

    let mut cfg = config::Config::load(cli.rcfile.as_deref())?;
    let overrides: Vec<(String, String)> = cli.overrides().collect();
    debug!(?overrides, "command line overrides");
    cfg.apply_overrides(overrides);

    let stdout = io::stdout().lock();
    let mut shell = commands::Shell::new(&cfg, stdout).context("invalid configuration")?;

    match cli.script.as_deref() {
        Some(path) => {
            let file = fs::File::open(path)
                .with_context(|| format!("failed to open script {}", path.display()))?;
            shell.run(BufReader::new(file))?;
        }
        None => {
            let stdin = io::stdin();
            let interactive = stdin.is_terminal();
            shell = shell.interactive(interactive);
            shell.run(stdin.lock())?;
        }
    }

    info!("done");
    Ok(())
}
