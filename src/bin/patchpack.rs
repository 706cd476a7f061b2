// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use patchpack::Pipeline;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::{path::PathBuf, process::exit};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "\n  patchpack create [options] <patch_dir> <distribution>\n  patchpack validate [options] <archive> <distribution>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl Cli {
    fn run(self) -> Result<()> {
        match self.command {
            Command::Create(opts) => run_create(opts),
            Command::Validate(opts) => run_validate(opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Reconcile a patch against a distribution and assemble the update
    /// archive.
    #[command(override_usage = "patchpack create [options] <patch_dir> <distribution>")]
    Create(CreateOptions),

    /// Cross-check an assembled update archive against a distribution.
    #[command(override_usage = "patchpack validate [options] <archive> <distribution>")]
    Validate(ValidateOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct CreateOptions {
    /// Directory holding the patch content and its descriptor.
    #[arg(value_name = "patch_dir")]
    pub patch_dir: PathBuf,

    /// Distribution to reconcile against, a directory or a zip archive.
    #[arg(value_name = "distribution")]
    pub distribution: PathBuf,

    /// Working directory for the staging tree and the output archive.
    #[arg(short, long, value_name = "dir", default_value = ".")]
    pub work_dir: PathBuf,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ValidateOptions {
    /// Previously assembled update archive.
    #[arg(value_name = "archive")]
    pub archive: PathBuf,

    /// Distribution to cross-check against, a directory or a zip archive.
    #[arg(value_name = "distribution")]
    pub distribution: PathBuf,
}

fn main() {
    let cli = Cli::parse();

    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time();
    let default_filter = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = cli.run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn run_create(opts: CreateOptions) -> Result<()> {
    let mut pipeline = Pipeline::new(opts.work_dir);
    let summary = pipeline.create(opts.patch_dir, opts.distribution)?;

    info!(
        "update archive ready at {:?} ({} entries staged, {} unmatched, {} mismatched)",
        summary.archive.display(),
        summary.staged_entries,
        summary.unmatched.len(),
        summary.mismatched.len()
    );

    Ok(())
}

fn run_validate(opts: ValidateOptions) -> Result<()> {
    let mut pipeline = Pipeline::new(".");
    let report = pipeline.validate(opts.archive, opts.distribution)?;

    if report.is_clean() {
        info!("package '{}' checks out against the distribution", report.package);
    } else {
        info!(
            "package '{}' validated with findings: {} missing parents, {} \
             undeclared, {} unshipped",
            report.package,
            report.missing_parents.len(),
            report.undeclared.len(),
            report.unshipped.len()
        );
    }

    Ok(())
}
