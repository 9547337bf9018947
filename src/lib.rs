//! cowdupe - Copy-on-write file deduplicator
//!
//! Finds files with identical content under one or more directories and
//! replaces every duplicate with a copy-on-write clone of a single master
//! copy. Files keep their own path and metadata while sharing storage.
//!
//! The pipeline:
//!
//! 1. [`scanner::Walker`] enumerates regular files
//! 2. [`duplicates::SizeIndex`] drops files with a unique size
//! 3. [`duplicates::hash_candidates`] computes SHA-256 digests in parallel
//!    into a [`duplicates::HashIndex`]
//! 4. [`actions::DedupExecutor`] replaces duplicates through a
//!    [`platform::CloneBackend`]

pub mod actions;
pub mod cli;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod logging;
pub mod output;
pub mod platform;
pub mod progress;
pub mod scanner;
pub mod signal;

use std::io::{self, IsTerminal};
use std::sync::Arc;

use anyhow::Context;

use crate::actions::{DedupExecutor, DedupReport};
use crate::cli::{Cli, OutputFormat};
use crate::config::Config;
use crate::duplicates::{DuplicateFinder, ScanSummary};
use crate::error::ExitCode;
use crate::output::{write_summary, JsonOutput};
use crate::progress::{LogProgress, Progress, ProgressCallback};

/// Run a full scan and replacement for parsed arguments.
///
/// The report is written to stdout; logs and progress go to stderr.
///
/// # Errors
///
/// Returns an error if the platform has no clone primitive, the
/// configuration is invalid, a root cannot be scanned, or the scan is
/// interrupted before duplicate groups are complete.
pub fn run_app(cli: Cli) -> anyhow::Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);
    platform::ensure_supported()?;

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    config.apply_cli(&cli)?;
    config.validate()?;
    log::debug!("Effective configuration: {:?}", config);

    let handler = signal::install_handler()?;
    let progress: Arc<dyn ProgressCallback> =
        if !cli.no_progress && !cli.quiet && io::stderr().is_terminal() {
            Arc::new(Progress::new())
        } else {
            Arc::new(LogProgress::new())
        };

    let finder = DuplicateFinder::new(
        config
            .finder_config()
            .with_shutdown_flag(handler.get_flag())
            .with_progress_callback(Arc::clone(&progress)),
    );
    let (groups, summary) = finder.find_duplicates(&cli.paths)?;

    let executor = DedupExecutor::native(
        config
            .replace_config()
            .with_shutdown_flag(handler.get_flag())
            .with_progress_callback(progress),
    );
    let report = executor.execute(groups);

    let exit_code = determine_exit_code(&summary, &report);
    let mut stdout = io::stdout().lock();
    match cli.output {
        OutputFormat::Text => write_summary(&mut stdout, &summary, &report)?,
        OutputFormat::Json => {
            JsonOutput::new(&summary, &report, exit_code).write_to(&mut stdout, true)?;
        }
    }

    log::info!("Done.");
    Ok(exit_code)
}

/// Exit code for a run that completed without a fatal error.
#[must_use]
pub fn determine_exit_code(summary: &ScanSummary, report: &DedupReport) -> ExitCode {
    if summary.interrupted || report.interrupted {
        ExitCode::Interrupted
    } else if summary.duplicate_groups == 0 {
        ExitCode::NoDuplicates
    } else if summary.has_errors() || report.has_failures() {
        ExitCode::PartialSuccess
    } else {
        ExitCode::Success
    }
}
