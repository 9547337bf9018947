//! JSON report of a deduplication run.
//!
//! # Output Schema
//!
//! ```json
//! {
//!   "groups": [
//!     {
//!       "digest": "ba7816bf...",
//!       "size": 1024,
//!       "master": "/data/a.bin",
//!       "duplicates": [
//!         { "path": "/data/b.bin", "status": "cloned", "bytes": 1024 },
//!         { "path": "/data/c.bin", "status": "skipped", "error": "file modified since scan: /data/c.bin" }
//!       ]
//!     }
//!   ],
//!   "summary": {
//!     "total_files": 100,
//!     "duplicate_groups": 1,
//!     "cloned": 1,
//!     "bytes_reclaimed": 1024,
//!     "reclaimed_mb": 0,
//!     "exit_code": 0,
//!     "exit_code_name": "CD000",
//!     "generated_at": "2024-01-01T00:00:00Z"
//!   }
//! }
//! ```

use std::io::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::actions::{DedupReport, GroupReport, ReplaceOutcome, ReplaceRecord};
use crate::duplicates::ScanSummary;
use crate::error::ExitCode;

/// One duplicate and what happened to it.
#[derive(Debug, Clone, Serialize)]
pub struct JsonDuplicate {
    /// Path of the duplicate
    pub path: String,
    /// `cloned`, `already_shared`, `would_clone`, `skipped`, `interrupted` or `failed`
    pub status: &'static str,
    /// Bytes reclaimed (or that would be, in a dry run)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
    /// Why the duplicate was left alone
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JsonDuplicate {
    fn from_record(record: &ReplaceRecord) -> Self {
        let bytes = match &record.result {
            Ok(ReplaceOutcome::Cloned { bytes, .. } | ReplaceOutcome::WouldClone { bytes }) => {
                Some(*bytes)
            }
            _ => None,
        };
        Self {
            path: record.duplicate.to_string_lossy().into_owned(),
            status: record.status(),
            bytes,
            error: record.result.as_ref().err().map(ToString::to_string),
        }
    }
}

/// A duplicate group in JSON format.
#[derive(Debug, Clone, Serialize)]
pub struct JsonGroup {
    /// SHA-256 digest as hexadecimal (64 characters)
    pub digest: String,
    /// File size in bytes
    pub size: u64,
    /// Clone source; never modified
    pub master: String,
    /// Every other file in the group
    pub duplicates: Vec<JsonDuplicate>,
}

impl JsonGroup {
    fn from_group_report(group: &GroupReport) -> Self {
        Self {
            digest: group.digest.to_hex(),
            size: group.size,
            master: group.master.to_string_lossy().into_owned(),
            duplicates: group.records.iter().map(JsonDuplicate::from_record).collect(),
        }
    }
}

/// Run totals in JSON format.
#[derive(Debug, Clone, Serialize)]
pub struct JsonSummary {
    /// Scanned roots after canonicalization
    pub roots: Vec<String>,
    /// Files enumerated
    pub total_files: usize,
    /// Bytes enumerated
    pub total_size: u64,
    /// Files dropped because their size was unique
    pub eliminated_by_size: usize,
    /// Files that shared a size and were hashed
    pub candidate_files: usize,
    /// Files hashed successfully
    pub hashed_files: usize,
    /// Files that could not be hashed
    pub hash_failures: usize,
    /// Files that could not be scanned
    pub scan_errors: usize,
    /// Confirmed duplicate groups
    pub duplicate_groups: usize,
    /// Duplicates excluding masters
    pub duplicate_files: usize,
    /// Duplicates replaced by clones
    pub cloned: usize,
    /// Duplicates already sharing storage
    pub already_shared: usize,
    /// Duplicates deliberately left alone
    pub skipped: usize,
    /// Duplicates that failed to be replaced
    pub failed: usize,
    /// Attributes that could not be restored on replaced files
    pub attribute_warnings: usize,
    /// Bytes reclaimed
    pub bytes_reclaimed: u64,
    /// Bytes reclaimed in whole megabytes
    pub reclaimed_mb: u64,
    /// Bytes a dry run would reclaim
    pub would_reclaim: u64,
    /// Whether nothing was modified
    pub dry_run: bool,
    /// Whether the run was interrupted
    pub interrupted: bool,
    /// Walk and hash time in milliseconds
    pub scan_duration_ms: u64,
    /// Replacement time in milliseconds
    pub dedup_duration_ms: u64,
    /// The exit code number
    pub exit_code: i32,
    /// The machine-readable exit code name (e.g., "CD000")
    pub exit_code_name: &'static str,
    /// When the report was produced
    pub generated_at: DateTime<Utc>,
}

impl JsonSummary {
    /// Combine scan and replacement totals.
    #[must_use]
    pub fn new(summary: &ScanSummary, report: &DedupReport, exit_code: ExitCode) -> Self {
        Self {
            roots: summary
                .roots
                .iter()
                .map(|r| r.to_string_lossy().into_owned())
                .collect(),
            total_files: summary.total_files,
            total_size: summary.total_size,
            eliminated_by_size: summary.eliminated_by_size,
            candidate_files: summary.candidate_files,
            hashed_files: summary.hashed_files,
            hash_failures: summary.hash_failures,
            scan_errors: summary.scan_errors.len(),
            duplicate_groups: summary.duplicate_groups,
            duplicate_files: summary.duplicate_files,
            cloned: report.cloned,
            already_shared: report.already_shared,
            skipped: report.skipped,
            failed: report.failed,
            attribute_warnings: report.attribute_warnings,
            bytes_reclaimed: report.bytes_reclaimed,
            reclaimed_mb: report.reclaimed_megabytes(),
            would_reclaim: report.would_reclaim,
            dry_run: report.dry_run,
            interrupted: summary.interrupted || report.interrupted,
            scan_duration_ms: u64::try_from(summary.scan_duration.as_millis()).unwrap_or(u64::MAX),
            dedup_duration_ms: u64::try_from(report.duration.as_millis()).unwrap_or(u64::MAX),
            exit_code: exit_code.as_i32(),
            exit_code_name: exit_code.code_prefix(),
            generated_at: Utc::now(),
        }
    }
}

/// Complete JSON output structure.
#[derive(Debug, Clone, Serialize)]
pub struct JsonOutput {
    /// Per-group results
    pub groups: Vec<JsonGroup>,
    /// Run totals
    pub summary: JsonSummary,
}

impl JsonOutput {
    /// Build the report for a finished run.
    ///
    /// ```
    /// use cowdupe::actions::DedupReport;
    /// use cowdupe::duplicates::ScanSummary;
    /// use cowdupe::error::ExitCode;
    /// use cowdupe::output::JsonOutput;
    ///
    /// let output = JsonOutput::new(&ScanSummary::default(), &DedupReport::default(), ExitCode::NoDuplicates);
    /// assert!(output.groups.is_empty());
    /// assert_eq!(output.summary.exit_code, 2);
    /// ```
    #[must_use]
    pub fn new(summary: &ScanSummary, report: &DedupReport, exit_code: ExitCode) -> Self {
        Self {
            groups: report.groups.iter().map(JsonGroup::from_group_report).collect(),
            summary: JsonSummary::new(summary, report, exit_code),
        }
    }

    /// Serialize to compact JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize to pretty-printed JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write JSON followed by a newline.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W, pretty: bool) -> Result<(), JsonOutputError> {
        let json = if pretty {
            self.to_json_pretty()?
        } else {
            self.to_json()?
        };
        writer.write_all(json.as_bytes())?;
        writer.write_all(b"\n")?;
        Ok(())
    }
}

/// Errors that can occur during JSON output.
#[derive(thiserror::Error, Debug)]
pub enum JsonOutputError {
    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error during writing
    #[error("I/O error during JSON output: {0}")]
    Io(#[from] std::io::Error),
}
