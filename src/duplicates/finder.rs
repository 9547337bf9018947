//! Duplicate detection pipeline.
//!
//! # Overview
//!
//! [`DuplicateFinder`] drives the read-only half of a run:
//!
//! 1. **Walk**: enumerate every root into a [`SizeIndex`]
//! 2. **Filter**: drop files whose size is unique
//! 3. **Hash**: SHA-256 every candidate on a bounded rayon pool, inserting
//!    results into a shared [`HashIndex`]
//! 4. **Group**: keep digests shared by two or more files
//!
//! Hashing is a barrier: [`hash_candidates`] returns only after every
//! candidate has either been indexed or failed. Nothing downstream runs
//! against a partially built index.
//!
//! A file that cannot be read is logged, counted, and left out of every
//! group. It will never be modified.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use bytesize::ByteSize;
use rayon::prelude::*;

use crate::progress::{ProgressCallback, PHASE_HASH, PHASE_WALK};
use crate::scanner::{
    FileEntry, HardlinkTracker, HashError, Hasher, ScanError, Walker, WalkerConfig,
    DEFAULT_CHUNK_SIZE,
};

use super::groups::{DedupGroup, GroupingStats, SizeIndex};
use super::index::HashIndex;

/// Configuration for the duplicate finder.
#[derive(Clone)]
pub struct FinderConfig {
    /// Hash worker threads. 0 uses the host's available parallelism.
    pub io_threads: usize,
    /// Bytes read per hashing call.
    pub chunk_size: usize,
    /// Directory walker options.
    pub walker_config: WalkerConfig,
    /// Set when the user requests shutdown.
    pub shutdown_flag: Option<Arc<AtomicBool>>,
    /// Receives walk and hash progress.
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for FinderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FinderConfig")
            .field("io_threads", &self.io_threads)
            .field("chunk_size", &self.chunk_size)
            .field("walker_config", &self.walker_config)
            .field("shutdown_flag", &self.shutdown_flag)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self {
            io_threads: 0,
            chunk_size: DEFAULT_CHUNK_SIZE,
            walker_config: WalkerConfig::default(),
            shutdown_flag: None,
            progress_callback: None,
        }
    }
}

impl FinderConfig {
    /// Set the number of hash workers (0 = host parallelism).
    #[must_use]
    pub fn with_io_threads(mut self, threads: usize) -> Self {
        self.io_threads = threads;
        self
    }

    /// Set the hashing read chunk size.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set the walker configuration.
    #[must_use]
    pub fn with_walker_config(mut self, config: WalkerConfig) -> Self {
        self.walker_config = config;
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

    /// Worker count that will actually be used.
    #[must_use]
    pub fn effective_io_threads(&self) -> usize {
        if self.io_threads > 0 {
            self.io_threads
        } else {
            std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
        }
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }
}

/// Counters from the hashing phase.
#[derive(Debug, Default)]
pub struct HashStats {
    /// Candidates submitted
    pub input_files: usize,
    /// Candidates successfully indexed
    pub hashed_files: usize,
    /// Candidates that could not be read
    pub failed_files: usize,
    /// Bytes of successfully hashed files
    pub bytes_hashed: u64,
    /// Whether shutdown cut the phase short
    pub interrupted: bool,
    /// Per-file failures, excluding interruptions
    pub errors: Vec<HashError>,
}

/// Hash every candidate on a pool of `config.io_threads` workers.
///
/// Blocks until all candidates are processed. Failures are recorded in the
/// returned stats and the failing file is left out of the index.
///
/// # Errors
///
/// Returns [`FinderError::ThreadPool`] if the worker pool cannot be built.
pub fn hash_candidates(
    candidates: Vec<FileEntry>,
    hasher: &Hasher,
    config: &FinderConfig,
) -> Result<(HashIndex, HashStats), FinderError> {
    let mut stats = HashStats {
        input_files: candidates.len(),
        ..Default::default()
    };
    let index = HashIndex::new();

    if candidates.is_empty() {
        log::debug!("No candidates to hash");
        return Ok((index, stats));
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.io_threads)
        .thread_name(|i| format!("cowdupe-hash-{i}"))
        .build()?;

    if let Some(ref callback) = config.progress_callback {
        callback.on_phase_start(PHASE_HASH, candidates.len());
    }

    let completed = AtomicUsize::new(0);
    let hashed_bytes = AtomicUsize::new(0);
    let interrupted = AtomicBool::new(false);
    let failures: Mutex<Vec<HashError>> = Mutex::new(Vec::new());

    pool.install(|| {
        candidates.into_par_iter().for_each(|file| {
            if config.is_shutdown_requested() {
                interrupted.store(true, Ordering::SeqCst);
                return;
            }

            let display = file.path.to_string_lossy().into_owned();
            match hasher.hash(&file.path) {
                Ok(digest) => {
                    log::trace!("{} {}", digest, file.path.display());
                    hashed_bytes.fetch_add(
                        usize::try_from(file.size).unwrap_or(usize::MAX),
                        Ordering::Relaxed,
                    );
                    if let Some(ref callback) = config.progress_callback {
                        callback.on_item_completed(file.size);
                    }
                    index.insert(digest, file);
                }
                Err(e) if e.is_interrupted() => {
                    interrupted.store(true, Ordering::SeqCst);
                    return;
                }
                Err(e) => {
                    log::warn!("Failed to hash {}: {}", file.path.display(), e);
                    failures
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(e);
                }
            }

            let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(ref callback) = config.progress_callback {
                callback.on_progress(done, &display);
            }
        });
    });

    if let Some(ref callback) = config.progress_callback {
        callback.on_phase_end(PHASE_HASH);
    }

    stats.errors = failures.into_inner().unwrap_or_else(PoisonError::into_inner);
    stats.failed_files = stats.errors.len();
    stats.hashed_files = index.len();
    stats.bytes_hashed = hashed_bytes.into_inner() as u64;
    stats.interrupted = interrupted.into_inner();

    if stats.interrupted {
        log::info!("Hashing interrupted by shutdown signal");
    }

    Ok((index, stats))
}

/// Summary of a duplicate scan.
#[derive(Debug, Default)]
pub struct ScanSummary {
    /// Roots that were scanned, canonicalized
    pub roots: Vec<PathBuf>,
    /// Regular files enumerated
    pub total_files: usize,
    /// Sum of enumerated file sizes
    pub total_size: u64,
    /// Files dropped for having a unique size
    pub eliminated_by_size: usize,
    /// Files submitted for hashing
    pub candidate_files: usize,
    /// Files hashed successfully
    pub hashed_files: usize,
    /// Files that could not be hashed
    pub hash_failures: usize,
    /// Distinct digests among hashed files
    pub unique_digests: usize,
    /// Groups of two or more identical files
    pub duplicate_groups: usize,
    /// Files that will be replaced (group members minus masters)
    pub duplicate_files: usize,
    /// Upper bound on bytes reclaimable by cloning
    pub reclaimable_space: u64,
    /// Enumeration errors
    pub scan_errors: Vec<ScanError>,
    /// Hashing errors
    pub hash_errors: Vec<HashError>,
    /// Wall time of walk and hash
    pub scan_duration: Duration,
    /// Whether shutdown interrupted the scan
    pub interrupted: bool,
}

impl ScanSummary {
    /// Human-readable reclaimable space.
    #[must_use]
    pub fn reclaimable_display(&self) -> String {
        ByteSize::b(self.reclaimable_space).to_string()
    }

    /// Human-readable total scanned size.
    #[must_use]
    pub fn total_size_display(&self) -> String {
        ByteSize::b(self.total_size).to_string()
    }

    /// Whether any file could not be enumerated or hashed.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.scan_errors.is_empty() || !self.hash_errors.is_empty()
    }

    fn absorb_grouping(&mut self, stats: &GroupingStats) {
        self.total_files = stats.total_files;
        self.total_size = stats.total_size;
        self.eliminated_by_size = stats.eliminated_unique;
        self.candidate_files = stats.candidate_files;
    }
}

/// Errors that stop duplicate finding.
#[derive(thiserror::Error, Debug)]
pub enum FinderError {
    /// Shutdown was requested before the index was complete.
    #[error("Scan interrupted by user")]
    Interrupted,

    /// A root does not exist.
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// A root is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// A root could not be resolved.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The hash worker pool could not be created.
    #[error("Failed to start hash workers: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Orchestrates walk, size filtering, hashing and grouping.
#[derive(Debug)]
pub struct DuplicateFinder {
    config: FinderConfig,
    hasher: Hasher,
}

impl DuplicateFinder {
    /// Create a finder.
    #[must_use]
    pub fn new(config: FinderConfig) -> Self {
        let mut hasher = Hasher::new().with_chunk_size(config.chunk_size);
        if let Some(ref flag) = config.shutdown_flag {
            hasher = hasher.with_shutdown_flag(Arc::clone(flag));
        }
        Self { config, hasher }
    }

    /// Create a finder with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(FinderConfig::default())
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &FinderConfig {
        &self.config
    }

    fn resolve_root(path: &Path) -> Result<PathBuf, FinderError> {
        if !path.exists() {
            return Err(FinderError::PathNotFound(path.to_path_buf()));
        }
        if !path.is_dir() {
            return Err(FinderError::NotADirectory(path.to_path_buf()));
        }
        path.canonicalize().map_err(|source| FinderError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Scan `roots` and return confirmed duplicate groups.
    ///
    /// A file reachable from several roots (nested roots, hardlinks) is
    /// considered once.
    ///
    /// # Errors
    ///
    /// Returns [`FinderError`] if a root is missing or not a directory, if
    /// the worker pool cannot start, or if shutdown was requested.
    pub fn find_duplicates(
        &self,
        roots: &[PathBuf],
    ) -> Result<(Vec<DedupGroup>, ScanSummary), FinderError> {
        let start = Instant::now();
        let mut summary = ScanSummary::default();

        for root in roots {
            summary.roots.push(Self::resolve_root(root)?);
        }

        if self.config.is_shutdown_requested() {
            return Err(FinderError::Interrupted);
        }

        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_start(PHASE_WALK, 0);
        }

        let mut size_index = SizeIndex::new();
        let mut tracker = HardlinkTracker::new();
        for root in &summary.roots {
            log::info!("Scanning {}", root.display());
            let mut walker = Walker::new(root, self.config.walker_config.clone());
            if let Some(ref flag) = self.config.shutdown_flag {
                walker = walker.with_shutdown_flag(Arc::clone(flag));
            }

            for result in walker.walk(&mut tracker) {
                match result {
                    Ok(file) => {
                        if let Some(ref callback) = self.config.progress_callback {
                            callback.on_progress(size_index.len() + 1, &file.path.to_string_lossy());
                        }
                        size_index.record(file);
                    }
                    Err(e) => summary.scan_errors.push(e),
                }
            }
        }

        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_end(PHASE_WALK);
        }

        if self.config.is_shutdown_requested() {
            return Err(FinderError::Interrupted);
        }

        log::info!(
            "Phase 1 complete: {} files ({}) enumerated",
            size_index.len(),
            ByteSize::b(size_index.total_size())
        );

        let groups = self.group_entries(size_index, &mut summary)?;
        summary.scan_duration = start.elapsed();
        Ok((groups, summary))
    }

    /// Run the pipeline on an already enumerated file list.
    ///
    /// # Errors
    ///
    /// Returns [`FinderError`] if the worker pool cannot start or shutdown
    /// was requested.
    pub fn find_duplicates_from_files(
        &self,
        files: Vec<FileEntry>,
    ) -> Result<(Vec<DedupGroup>, ScanSummary), FinderError> {
        let start = Instant::now();
        let mut summary = ScanSummary::default();
        let mut size_index = SizeIndex::new();
        for file in files {
            size_index.record(file);
        }
        let groups = self.group_entries(size_index, &mut summary)?;
        summary.scan_duration = start.elapsed();
        Ok((groups, summary))
    }

    fn group_entries(
        &self,
        size_index: SizeIndex,
        summary: &mut ScanSummary,
    ) -> Result<Vec<DedupGroup>, FinderError> {
        log::info!("Making duplicate candidate list");
        let (candidates, grouping) = size_index.into_candidates();
        summary.absorb_grouping(&grouping);

        log::info!(
            "Phase 2 complete: {} candidates, {} unique sizes eliminated ({:.1}%)",
            grouping.candidate_files,
            grouping.eliminated_unique,
            grouping.elimination_rate()
        );
        log::info!(
            "Generating checksums for {} files on {} threads",
            candidates.len(),
            self.config.effective_io_threads()
        );

        let (index, stats) = hash_candidates(candidates, &self.hasher, &self.config)?;
        if stats.interrupted || self.config.is_shutdown_requested() {
            summary.interrupted = true;
            return Err(FinderError::Interrupted);
        }

        summary.hashed_files = stats.hashed_files;
        summary.hash_failures = stats.failed_files;
        summary.hash_errors = stats.errors;
        summary.unique_digests = index.unique_digests();

        log::info!(
            "Indexing finished - {} unique hashes found",
            summary.unique_digests
        );

        let groups = index.into_groups();
        summary.duplicate_groups = groups.len();
        summary.duplicate_files = groups.iter().map(|g| g.duplicates().len()).sum();
        summary.reclaimable_space = groups.iter().map(DedupGroup::reclaimable).sum();

        log::info!(
            "Phase 3 complete: {} groups, {} duplicates, {} reclaimable",
            summary.duplicate_groups,
            summary.duplicate_files,
            summary.reclaimable_display()
        );

        Ok(groups)
    }
}
