//! Command-line interface definitions for cowdupe.
//!
//! # Example
//!
//! ```bash
//! # Replace duplicates under two trees with clones
//! cowdupe ~/Photos /Volumes/Backup/Photos
//!
//! # See what would happen, as JSON
//! cowdupe --dry-run --output json ~/Downloads
//!
//! # Only consider files of at least 1 MiB, hashing on 4 threads
//! cowdupe --min-size 1MiB --io-threads 4 ~/Projects
//! ```

use std::fmt;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Reclaim disk space by replacing duplicate files with copy-on-write clones.
///
/// Files with identical content are found by size and SHA-256 digest. Every
/// duplicate is replaced by a clone of one master copy; each file keeps its
/// own permissions, ownership, timestamps and extended attributes. Requires
/// a filesystem with reflink support (APFS, btrfs, XFS, ...).
#[derive(Debug, Parser)]
#[command(name = "cowdupe")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directories to scan; overlapping roots are scanned once
    #[arg(value_name = "PATH", required = true, num_args = 1..)]
    pub paths: Vec<PathBuf>,

    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Configuration file (default: platform config dir, cowdupe/config.toml)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Number of hashing threads (0 = one per CPU)
    #[arg(long, value_name = "N")]
    pub io_threads: Option<usize>,

    /// Bytes read per hashing call (e.g. 100MB, 64MiB)
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub chunk_size: Option<u64>,

    /// Minimum file size to consider (e.g. 1KB, 1MiB)
    ///
    /// Supports suffixes: B, KB, KiB, MB, MiB, GB, GiB, TB, TiB
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub min_size: Option<u64>,

    /// Maximum file size to consider (e.g. 1GB)
    ///
    /// Supports suffixes: B, KB, KiB, MB, MiB, GB, GiB, TB, TiB
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub max_size: Option<u64>,

    /// Gitignore-style pattern to skip (repeatable)
    #[arg(short, long = "ignore", value_name = "PATTERN")]
    pub ignore_patterns: Vec<String>,

    /// Skip hidden files and directories (starting with .)
    #[arg(long)]
    pub skip_hidden: bool,

    /// Compare files byte for byte before replacing them
    #[arg(long)]
    pub paranoid: bool,

    /// Keep the original when any attribute cannot be restored on its clone
    #[arg(long)]
    pub strict_attributes: bool,

    /// Report what would be replaced without changing anything
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Output format for the final report
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,

    /// Print fatal errors as JSON on stderr
    #[arg(long)]
    pub json_errors: bool,

    /// Disable progress bars (progress is logged instead)
    #[arg(long)]
    pub no_progress: bool,
}

/// Final report format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary
    #[default]
    Text,
    /// Machine-readable JSON report
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Size units accepted on the command line, matched case-insensitively.
const SIZE_UNITS: &[(&str, u64)] = &[
    ("", 1),
    ("B", 1),
    ("K", 1_000),
    ("KB", 1_000),
    ("KIB", 1 << 10),
    ("M", 1_000_000),
    ("MB", 1_000_000),
    ("MIB", 1 << 20),
    ("G", 1_000_000_000),
    ("GB", 1_000_000_000),
    ("GIB", 1 << 30),
    ("T", 1_000_000_000_000),
    ("TB", 1_000_000_000_000),
    ("TIB", 1 << 40),
];

/// Parse a human-readable size such as `512`, `1.5MB` or `64KiB`.
///
/// Decimal units (KB, MB, ...) are powers of 1000; binary units (KiB,
/// MiB, ...) are powers of 1024.
///
/// # Errors
///
/// Returns a message for empty input, a malformed number, a negative
/// value, an unknown unit, or a value that overflows `u64`.
pub fn parse_size(input: &str) -> Result<u64, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("Size cannot be empty".to_string());
    }

    let split = input
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-'))
        .unwrap_or(input.len());
    let (number, unit) = input.split_at(split);
    let unit = unit.trim().to_ascii_uppercase();

    let value: f64 = number
        .parse()
        .map_err(|_| format!("Invalid number: '{number}'"))?;
    if value < 0.0 {
        return Err("Size cannot be negative".to_string());
    }

    let multiplier = SIZE_UNITS
        .iter()
        .find(|(name, _)| *name == unit)
        .map(|(_, m)| *m)
        .ok_or_else(|| format!("Unknown size suffix: '{unit}'"))?;

    let bytes = value * multiplier as f64;
    if bytes > u64::MAX as f64 {
        return Err(format!("Size too large: '{input}'"));
    }
    Ok(bytes as u64)
}
