//! Replacement of duplicates with copy-on-write clones.
//!
//! # Overview
//!
//! For every [`DedupGroup`] the first file is the master. Each other file is
//! replaced by a clone of the master that carries the duplicate's own
//! metadata:
//!
//! 1. Check master and duplicate still match their scan-time size and mtime
//! 2. Skip the pair if it already shares storage
//! 3. Capture the duplicate's attributes; skip it if it has other hard links
//! 4. Optionally compare contents byte for byte (paranoid mode)
//! 5. Clone the master to a temporary sibling of the duplicate
//! 6. Restore the captured attributes onto the clone
//! 7. Atomically rename the clone over the duplicate
//!
//! Until the rename the duplicate is untouched, and the rename either fully
//! happens or not at all. Any failure leaves the original in place and the
//! temporary clone is removed.
//!
//! Savings are the pre-replacement size of each successfully replaced
//! duplicate.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use bytesize::ByteSize;
use thiserror::Error;

use crate::duplicates::DedupGroup;
use crate::platform::{CloneBackend, ReflinkBackend};
use crate::progress::{ProgressCallback, PHASE_CLONE};
use crate::scanner::{Digest, FileEntry};

use super::attributes::{AttributeError, FileAttributes};
use super::verify::contents_equal;

const TEMP_PREFIX: &str = ".cowdupe-";
const TEMP_SUFFIX: &str = ".tmp";

/// Why a duplicate was not replaced.
#[derive(Debug, Error)]
pub enum ReplaceError {
    /// File changed (size, mtime, or existence) since it was scanned.
    #[error("file modified since scan: {0}")]
    Modified(PathBuf),

    /// The duplicate's inode has other names. Replacing this one would split
    /// the link without freeing any blocks.
    #[error("{path} has {links} hard links")]
    Hardlinked {
        /// Duplicate that was kept
        path: PathBuf,
        /// Link count at capture time
        links: u64,
    },

    /// Byte comparison found different contents despite equal digests.
    #[error("contents differ from master {master}: {duplicate}")]
    ContentMismatch {
        /// Master of the group
        master: PathBuf,
        /// Duplicate that differs
        duplicate: PathBuf,
    },

    /// Metadata could not be read.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Duplicate attributes could not be captured.
    #[error(transparent)]
    Attributes(#[from] AttributeError),

    /// The filesystem refused to create the clone.
    #[error("clone of {master} failed for {duplicate}: {source}")]
    Clone {
        /// Clone source
        master: PathBuf,
        /// Duplicate that would have been replaced
        duplicate: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Strict mode refused a clone whose attributes were not fully restored.
    #[error("{failures} attribute(s) could not be restored for {path}")]
    RestoreRejected {
        /// Duplicate that was kept
        path: PathBuf,
        /// Number of attributes that failed
        failures: usize,
    },

    /// The clone could not be moved over the duplicate.
    #[error("failed to replace {path}: {source}")]
    Rename {
        /// Duplicate that was kept
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Shutdown was requested before this duplicate was reached.
    #[error("interrupted before processing")]
    Interrupted,
}

impl ReplaceError {
    /// Whether this is a deliberate skip rather than a failure.
    #[must_use]
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            Self::Modified(_)
                | Self::Hardlinked { .. }
                | Self::ContentMismatch { .. }
                | Self::Interrupted
        )
    }
}

/// What happened to a duplicate that was not rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
    /// Replaced by a clone; `bytes` were reclaimed.
    Cloned {
        /// Pre-replacement size of the duplicate
        bytes: u64,
        /// Attributes that could not be restored
        attribute_warnings: usize,
    },
    /// Already shares storage with the master; nothing to do.
    AlreadyShared,
    /// Dry run: would have been replaced.
    WouldClone {
        /// Pre-replacement size of the duplicate
        bytes: u64,
    },
}

/// Result for one duplicate.
#[derive(Debug)]
pub struct ReplaceRecord {
    /// The duplicate's path
    pub duplicate: PathBuf,
    /// Outcome or reason it was left alone
    pub result: Result<ReplaceOutcome, ReplaceError>,
}

impl ReplaceRecord {
    /// Short machine-readable status.
    #[must_use]
    pub fn status(&self) -> &'static str {
        match &self.result {
            Ok(ReplaceOutcome::Cloned { .. }) => "cloned",
            Ok(ReplaceOutcome::AlreadyShared) => "already_shared",
            Ok(ReplaceOutcome::WouldClone { .. }) => "would_clone",
            Err(ReplaceError::Interrupted) => "interrupted",
            Err(e) if e.is_skip() => "skipped",
            Err(_) => "failed",
        }
    }
}

/// Per-group results.
#[derive(Debug)]
pub struct GroupReport {
    /// Shared digest
    pub digest: Digest,
    /// Shared size
    pub size: u64,
    /// Clone source
    pub master: PathBuf,
    /// One record per duplicate, in group order
    pub records: Vec<ReplaceRecord>,
}

/// Totals for a replacement run.
#[derive(Debug, Default)]
pub struct DedupReport {
    /// Per-group detail
    pub groups: Vec<GroupReport>,
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
    /// Bytes freed by replaced duplicates
    pub bytes_reclaimed: u64,
    /// Bytes a dry run would free
    pub would_reclaim: u64,
    /// Whether this was a dry run
    pub dry_run: bool,
    /// Whether shutdown stopped the run early
    pub interrupted: bool,
    /// Wall time of the replacement phase
    pub duration: Duration,
}

impl DedupReport {
    /// Reclaimed bytes in whole megabytes (10^6), truncated.
    #[must_use]
    pub fn reclaimed_megabytes(&self) -> u64 {
        self.bytes_reclaimed / 1_000_000
    }

    /// Human-readable reclaimed size.
    #[must_use]
    pub fn reclaimed_display(&self) -> String {
        ByteSize::b(self.bytes_reclaimed).to_string()
    }

    /// Whether any duplicate failed to be replaced.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    /// Total duplicates visited.
    #[must_use]
    pub fn total_duplicates(&self) -> usize {
        self.groups.iter().map(|g| g.records.len()).sum()
    }

    fn tally(&mut self, record: &ReplaceRecord) {
        match &record.result {
            Ok(ReplaceOutcome::Cloned {
                bytes,
                attribute_warnings,
            }) => {
                self.cloned += 1;
                self.bytes_reclaimed = self.bytes_reclaimed.saturating_add(*bytes);
                self.attribute_warnings += attribute_warnings;
            }
            Ok(ReplaceOutcome::AlreadyShared) => self.already_shared += 1,
            Ok(ReplaceOutcome::WouldClone { bytes }) => {
                self.would_reclaim = self.would_reclaim.saturating_add(*bytes);
            }
            Err(e) if e.is_skip() => self.skipped += 1,
            Err(_) => self.failed += 1,
        }
    }
}

/// Options for the replacement phase.
#[derive(Clone, Default)]
pub struct ReplaceConfig {
    /// Compare contents byte for byte before replacing.
    pub paranoid: bool,
    /// Keep the original when any attribute fails to restore.
    pub strict_attributes: bool,
    /// Report what would happen without writing anything.
    pub dry_run: bool,
    /// Set when the user requests shutdown.
    pub shutdown_flag: Option<Arc<AtomicBool>>,
    /// Receives per-duplicate progress.
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for ReplaceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplaceConfig")
            .field("paranoid", &self.paranoid)
            .field("strict_attributes", &self.strict_attributes)
            .field("dry_run", &self.dry_run)
            .field("shutdown_flag", &self.shutdown_flag)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl ReplaceConfig {
    /// Enable or disable byte comparison.
    #[must_use]
    pub fn with_paranoid(mut self, enabled: bool) -> Self {
        self.paranoid = enabled;
        self
    }

    /// Enable or disable strict attribute restoration.
    #[must_use]
    pub fn with_strict_attributes(mut self, enabled: bool) -> Self {
        self.strict_attributes = enabled;
        self
    }

    /// Enable or disable dry-run mode.
    #[must_use]
    pub fn with_dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Set the shutdown flag.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Set the progress callback.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }
}

/// Replaces duplicates with clones of their group's master.
#[derive(Debug)]
pub struct DedupExecutor<B = ReflinkBackend> {
    backend: B,
    config: ReplaceConfig,
}

impl DedupExecutor<ReflinkBackend> {
    /// Executor using the host's native clone primitive.
    #[must_use]
    pub fn native(config: ReplaceConfig) -> Self {
        Self::new(ReflinkBackend, config)
    }
}

impl<B: CloneBackend> DedupExecutor<B> {
    /// Create an executor with an explicit backend.
    #[must_use]
    pub fn new(backend: B, config: ReplaceConfig) -> Self {
        Self { backend, config }
    }

    /// Process every group sequentially.
    ///
    /// Every duplicate gets exactly one record; masters are never written.
    /// Shutdown is checked between duplicates, and once requested the
    /// remaining duplicates are recorded as interrupted.
    #[must_use]
    pub fn execute(&self, groups: Vec<DedupGroup>) -> DedupReport {
        let start = Instant::now();
        let mut report = DedupReport {
            dry_run: self.config.dry_run,
            ..Default::default()
        };

        let total: usize = groups.iter().map(|g| g.duplicates().len()).sum();
        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_start(PHASE_CLONE, total);
        }

        let mut done = 0usize;
        for group in &groups {
            let master = group.master();
            log::debug!(
                "Group {}: {} files of {} bytes, master {}",
                group.digest,
                group.len(),
                group.size,
                master.path.display()
            );

            let master_check = check_unchanged(master);
            if let Err(ref e) = master_check {
                log::warn!("Skipping group, master unusable: {}", e);
            }

            let mut records = Vec::with_capacity(group.duplicates().len());
            for duplicate in group.duplicates() {
                let result = if self.config.is_shutdown_requested() {
                    report.interrupted = true;
                    Err(ReplaceError::Interrupted)
                } else if master_check.is_err() {
                    Err(ReplaceError::Modified(master.path.clone()))
                } else {
                    self.replace_one(master, duplicate)
                };

                match &result {
                    Ok(ReplaceOutcome::AlreadyShared) => {
                        log::debug!("Already shared: {}", duplicate.path.display());
                    }
                    Err(ReplaceError::Interrupted) => {}
                    Err(e) if e.is_skip() => log::info!("Skipped: {}", e),
                    Err(e) => log::warn!("{}", e),
                    Ok(_) => {}
                }

                let record = ReplaceRecord {
                    duplicate: duplicate.path.clone(),
                    result,
                };
                report.tally(&record);
                records.push(record);

                done += 1;
                if let Some(ref callback) = self.config.progress_callback {
                    callback.on_progress(done, &duplicate.path.to_string_lossy());
                }
            }

            report.groups.push(GroupReport {
                digest: group.digest,
                size: group.size,
                master: master.path.clone(),
                records,
            });
        }

        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_end(PHASE_CLONE);
        }

        report.duration = start.elapsed();
        if report.dry_run {
            log::info!(
                "Dry run: would reclaim {} MB ({})",
                report.would_reclaim / 1_000_000,
                ByteSize::b(report.would_reclaim)
            );
        } else {
            log::info!(
                "Reclaimed {} MB ({}) from {} clones, {} already shared, {} skipped, {} failed",
                report.reclaimed_megabytes(),
                report.reclaimed_display(),
                report.cloned,
                report.already_shared,
                report.skipped,
                report.failed
            );
        }
        report
    }

    /// Replace a single duplicate with a clone of `master`.
    ///
    /// # Errors
    ///
    /// Returns a [`ReplaceError`] describing why the duplicate was kept.
    /// The duplicate is unmodified whenever an error is returned.
    pub fn replace_one(
        &self,
        master: &FileEntry,
        duplicate: &FileEntry,
    ) -> Result<ReplaceOutcome, ReplaceError> {
        check_unchanged(duplicate)?;

        match self.backend.shares_data(&master.path, &duplicate.path) {
            Ok(true) => return Ok(ReplaceOutcome::AlreadyShared),
            Ok(false) => {}
            Err(e) => log::debug!(
                "Could not compare extents of {}: {}",
                duplicate.path.display(),
                e
            ),
        }

        let attributes = FileAttributes::capture(&duplicate.path)?;
        if attributes.links > 1 {
            return Err(ReplaceError::Hardlinked {
                path: duplicate.path.clone(),
                links: attributes.links,
            });
        }

        if self.config.paranoid {
            let equal =
                contents_equal(&master.path, &duplicate.path).map_err(|source| ReplaceError::Io {
                    path: duplicate.path.clone(),
                    source,
                })?;
            if !equal {
                return Err(ReplaceError::ContentMismatch {
                    master: master.path.clone(),
                    duplicate: duplicate.path.clone(),
                });
            }
        }

        if self.config.dry_run {
            log::info!(
                "would deduplicate: {} from {}",
                duplicate.path.display(),
                master.path.display()
            );
            return Ok(ReplaceOutcome::WouldClone {
                bytes: attributes.len,
            });
        }

        log::info!(
            "deduplicating: {} from {}",
            duplicate.path.display(),
            master.path.display()
        );

        let dir = duplicate.path.parent().unwrap_or_else(|| Path::new("."));
        let clone = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(TEMP_SUFFIX)
            .make_in(dir, |path| self.backend.clone_file(&master.path, path))
            .map_err(|source| ReplaceError::Clone {
                master: master.path.clone(),
                duplicate: duplicate.path.clone(),
                source,
            })?;

        let failures = attributes.restore(clone.path());
        for failure in &failures {
            log::warn!("{}", failure);
        }
        if self.config.strict_attributes && !failures.is_empty() {
            return Err(ReplaceError::RestoreRejected {
                path: duplicate.path.clone(),
                failures: failures.len(),
            });
        }

        // The duplicate may have changed while the clone was being prepared.
        check_unchanged(duplicate)?;

        clone
            .persist(&duplicate.path)
            .map_err(|e| ReplaceError::Rename {
                path: duplicate.path.clone(),
                source: e.error,
            })?;

        Ok(ReplaceOutcome::Cloned {
            bytes: attributes.len,
            attribute_warnings: failures.len(),
        })
    }
}

/// Confirm `entry` still has its scan-time size and modification time.
fn check_unchanged(entry: &FileEntry) -> Result<(), ReplaceError> {
    let metadata = match fs::symlink_metadata(&entry.path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ReplaceError::Modified(entry.path.clone()));
        }
        Err(source) => {
            return Err(ReplaceError::Io {
                path: entry.path.clone(),
                source,
            })
        }
    };

    let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
    if !metadata.is_file() || metadata.len() != entry.size || modified != entry.modified {
        return Err(ReplaceError::Modified(entry.path.clone()));
    }
    Ok(())
}
