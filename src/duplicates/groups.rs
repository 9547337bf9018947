//! Size bucketing and confirmed duplicate groups.
//!
//! # Overview
//!
//! Two files can only share content if they share a byte size, so the
//! pipeline first buckets every enumerated file by size in a [`SizeIndex`].
//! Buckets with a single file can never yield a duplicate and are dropped
//! before any file is opened; only the remaining candidates are hashed.
//!
//! After hashing, files with equal size and digest form a [`DedupGroup`]:
//! the first file is the master that the others will be cloned from.
//!
//! # Example
//!
//! ```
//! use cowdupe::duplicates::SizeIndex;
//! use cowdupe::scanner::FileEntry;
//! use std::path::PathBuf;
//! use std::time::SystemTime;
//!
//! let mut index = SizeIndex::new();
//! index.record(FileEntry::new(PathBuf::from("/a"), 1024, SystemTime::now()));
//! index.record(FileEntry::new(PathBuf::from("/b"), 1024, SystemTime::now()));
//! index.record(FileEntry::new(PathBuf::from("/c"), 2048, SystemTime::now()));
//!
//! let (candidates, stats) = index.into_candidates();
//! assert_eq!(candidates.len(), 2);
//! assert_eq!(stats.eliminated_unique, 1);
//! ```

use std::collections::HashMap;

use bytesize::ByteSize;

use crate::scanner::{Digest, FileEntry};

/// Map from byte size to every file of that size, in enumeration order.
#[derive(Debug, Default)]
pub struct SizeIndex {
    buckets: HashMap<u64, Vec<FileEntry>>,
    total_files: usize,
    total_size: u64,
}

impl SizeIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `entry` to the bucket for its size, creating the bucket on
    /// first use.
    pub fn record(&mut self, entry: FileEntry) {
        self.total_files += 1;
        self.total_size = self.total_size.saturating_add(entry.size);
        self.buckets.entry(entry.size).or_default().push(entry);
    }

    /// Number of files recorded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.total_files
    }

    /// Whether nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total_files == 0
    }

    /// Number of distinct sizes seen.
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Sum of all recorded file sizes.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Files recorded under `size`, if any.
    #[must_use]
    pub fn bucket(&self, size: u64) -> Option<&[FileEntry]> {
        self.buckets.get(&size).map(Vec::as_slice)
    }

    /// Consume the index and return every file whose size is shared with at
    /// least one other file.
    ///
    /// Buckets are emitted largest size first so the longest hashing jobs
    /// are scheduled early; within a bucket, enumeration order is kept.
    #[must_use]
    pub fn into_candidates(self) -> (Vec<FileEntry>, GroupingStats) {
        let mut stats = GroupingStats {
            total_files: self.total_files,
            total_size: self.total_size,
            unique_sizes: self.buckets.len(),
            ..Default::default()
        };

        let mut buckets: Vec<(u64, Vec<FileEntry>)> = self.buckets.into_iter().collect();
        buckets.sort_unstable_by(|a, b| b.0.cmp(&a.0));

        let mut candidates = Vec::new();
        for (size, files) in buckets {
            if files.len() < 2 {
                stats.eliminated_unique += files.len();
                continue;
            }
            stats.candidate_buckets += 1;
            stats.candidate_files += files.len();
            stats.candidate_bytes = stats
                .candidate_bytes
                .saturating_add(size.saturating_mul(files.len() as u64));
            candidates.extend(files);
        }

        log::debug!(
            "Size bucketing: {} files in {} sizes, {} candidates, {} unique eliminated",
            stats.total_files,
            stats.unique_sizes,
            stats.candidate_files,
            stats.eliminated_unique
        );

        (candidates, stats)
    }
}

/// Counters produced when the size index is reduced to candidates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupingStats {
    /// Files recorded in the index
    pub total_files: usize,
    /// Sum of all recorded sizes
    pub total_size: u64,
    /// Distinct sizes seen
    pub unique_sizes: usize,
    /// Files in buckets of two or more
    pub candidate_files: usize,
    /// Buckets of two or more
    pub candidate_buckets: usize,
    /// Files dropped because their size was unique
    pub eliminated_unique: usize,
    /// Bytes that will be hashed
    pub candidate_bytes: u64,
}

impl GroupingStats {
    /// Percentage of files eliminated without being opened.
    #[must_use]
    pub fn elimination_rate(&self) -> f64 {
        if self.total_files == 0 {
            0.0
        } else {
            (self.eliminated_unique as f64 / self.total_files as f64) * 100.0
        }
    }
}

/// Files with identical size and SHA-256 digest.
///
/// Always holds at least two files. The first one is the master; the
/// rest will be replaced by clones of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupGroup {
    /// Content digest shared by every file
    pub digest: Digest,
    /// Byte size shared by every file
    pub size: u64,
    files: Vec<FileEntry>,
}

impl DedupGroup {
    /// Build a group. Returns `None` for fewer than two files.
    #[must_use]
    pub fn new(digest: Digest, files: Vec<FileEntry>) -> Option<Self> {
        if files.len() < 2 {
            return None;
        }
        let size = files[0].size;
        debug_assert!(files.iter().all(|f| f.size == size));
        Some(Self {
            digest,
            size,
            files,
        })
    }

    /// Every file in the group, master first.
    #[must_use]
    pub fn files(&self) -> &[FileEntry] {
        &self.files
    }

    /// The file every duplicate will be cloned from.
    #[must_use]
    pub fn master(&self) -> &FileEntry {
        &self.files[0]
    }

    /// Files to be replaced.
    #[must_use]
    pub fn duplicates(&self) -> &[FileEntry] {
        &self.files[1..]
    }

    /// Number of files including the master.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Always `false`; groups hold at least two files.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Bytes freed if every duplicate becomes a clone.
    #[must_use]
    pub fn reclaimable(&self) -> u64 {
        self.size.saturating_mul(self.duplicates().len() as u64)
    }

    /// Human-readable reclaimable size.
    #[must_use]
    pub fn reclaimable_display(&self) -> String {
        ByteSize::b(self.reclaimable()).to_string()
    }
}
