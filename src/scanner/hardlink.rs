//! Hardlink and overlapping-root detection.
//!
//! Two directory entries pointing at the same inode are one file, not two.
//! Cloning one over the other would gain nothing and, worse, the replacement
//! step would rewrite the master through its own alias. The tracker records
//! every (device, inode) pair it sees so that later aliases are dropped.
//!
//! One tracker is shared across all scan roots, so a file reachable from two
//! overlapping roots (`/data` and `/data/photos`) is enumerated once.
//!
//! On non-Unix targets no inode information is available and every file is
//! treated as distinct.

use std::collections::HashSet;
use std::fs::Metadata;

/// Identity of an on-disk file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct InodeKey {
    device: u64,
    inode: u64,
}

impl InodeKey {
    #[cfg(unix)]
    fn from_metadata(metadata: &Metadata) -> Option<Self> {
        use std::os::unix::fs::MetadataExt;
        Some(Self {
            device: metadata.dev(),
            inode: metadata.ino(),
        })
    }

    #[cfg(not(unix))]
    fn from_metadata(_metadata: &Metadata) -> Option<Self> {
        None
    }
}

/// Remembers which inodes have already been enumerated.
///
/// Not thread-safe; the walker owns it behind a `&mut` for the whole scan.
#[derive(Debug, Default)]
pub struct HardlinkTracker {
    seen: HashSet<InodeKey>,
}

impl HardlinkTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if this file's inode was seen before.
    ///
    /// The first occurrence of an inode is recorded and reported as `false`.
    pub fn is_hardlink(&mut self, metadata: &Metadata) -> bool {
        match InodeKey::from_metadata(metadata) {
            Some(key) => !self.seen.insert(key),
            None => false,
        }
    }

    /// Number of distinct inodes recorded so far.
    #[must_use]
    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    /// Forget every recorded inode.
    pub fn clear(&mut self) {
        self.seen.clear();
    }
}
