//! Concurrent digest-to-files index.
//!
//! Hash workers call [`HashIndex::insert`] from many threads at once. A
//! single mutex guards the map: the critical section is one hashmap push,
//! negligible next to reading a file. After the hashing barrier the index is
//! consumed with [`HashIndex::into_groups`], which needs no locking.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::scanner::{Digest, FileEntry};

use super::groups::DedupGroup;

/// Digest-keyed buckets shared by all hash workers.
#[derive(Debug, Default)]
pub struct HashIndex {
    buckets: Mutex<HashMap<Digest, Vec<FileEntry>>>,
}

impl HashIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // A worker that panicked mid-push leaves the map structurally sound.
    fn lock(&self) -> MutexGuard<'_, HashMap<Digest, Vec<FileEntry>>> {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `entry` under `digest`. Safe to call from any thread.
    pub fn insert(&self, digest: Digest, entry: FileEntry) {
        self.lock().entry(digest).or_default().push(entry);
    }

    /// Total number of files inserted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().values().map(Vec::len).sum()
    }

    /// Whether nothing has been inserted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of distinct digests.
    #[must_use]
    pub fn unique_digests(&self) -> usize {
        self.lock().len()
    }

    /// Consume the index, keeping only digests shared by two or more files.
    ///
    /// Groups are ordered by descending size, then digest, so processing
    /// order is stable across runs. Within a group, insertion order is kept;
    /// the first file to finish hashing becomes the master.
    #[must_use]
    pub fn into_groups(self) -> Vec<DedupGroup> {
        let buckets = self
            .buckets
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);

        let mut groups: Vec<DedupGroup> = buckets
            .into_iter()
            .filter_map(|(digest, files)| DedupGroup::new(digest, files))
            .collect();
        groups.sort_unstable_by(|a, b| b.size.cmp(&a.size).then(a.digest.cmp(&b.digest)));
        groups
    }
}
