//! Directory walker built on jwalk.
//!
//! # Overview
//!
//! [`Walker`] enumerates every regular file under a root, yielding one
//! [`FileEntry`] per distinct inode. It never follows symbolic links and
//! silently skips everything that is not a regular file (directories,
//! symlinks, sockets, FIFOs, devices).
//!
//! Zero-byte files are reported like any other file: they group together by
//! size and content and are deduplicated with zero savings.
//!
//! Ignore patterns are matched relative to the root. A matching directory is
//! pruned and never read.

use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use jwalk::WalkDir;

use super::hardlink::HardlinkTracker;
use super::{FileEntry, ScanError, WalkerConfig};

/// Walks a single root directory.
#[derive(Debug)]
pub struct Walker {
    root: PathBuf,
    config: WalkerConfig,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Walker {
    /// Create a walker for `root`.
    #[must_use]
    pub fn new(root: &Path, config: WalkerConfig) -> Self {
        Self {
            root: root.to_path_buf(),
            config,
            shutdown_flag: None,
        }
    }

    /// Stop yielding entries once `flag` is set.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Root directory this walker enumerates.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    fn build_ignore_matcher(&self) -> Option<Gitignore> {
        if self.config.ignore_patterns.is_empty() {
            return None;
        }

        let mut builder = GitignoreBuilder::new(&self.root);
        for pattern in &self.config.ignore_patterns {
            if let Err(e) = builder.add_line(None, pattern) {
                log::warn!("Invalid ignore pattern '{}': {}", pattern, e);
            }
        }

        match builder.build() {
            Ok(matcher) => Some(matcher),
            Err(e) => {
                log::warn!("Failed to build ignore patterns: {}", e);
                None
            }
        }
    }

    fn passes_size_filter(&self, size: u64) -> bool {
        self.config.min_size.is_none_or(|min| size >= min)
            && self.config.max_size.is_none_or(|max| size <= max)
    }

    /// Walk the tree, yielding regular files.
    ///
    /// `tracker` is consulted for every file so that hardlinks and files
    /// reachable from several overlapping roots are reported once. Pass the
    /// same tracker to every root's walk.
    ///
    /// Errors are yielded as [`ScanError`] values and do not stop iteration.
    pub fn walk<'a>(
        &'a self,
        tracker: &'a mut HardlinkTracker,
    ) -> impl Iterator<Item = Result<FileEntry, ScanError>> + 'a {
        let matcher = self.build_ignore_matcher();
        let root = self.root.clone();

        let walk_dir = WalkDir::new(&self.root)
            .follow_links(false)
            .skip_hidden(self.config.skip_hidden)
            .process_read_dir(move |_depth, _path, _read_dir_state, children| {
                if let Some(matcher) = &matcher {
                    children.retain(|child| match child {
                        Ok(entry) => {
                            let path = entry.path();
                            let relative = path.strip_prefix(&root).unwrap_or(&path);
                            let ignored = matcher
                                .matched(relative, entry.file_type().is_dir())
                                .is_ignore();
                            if ignored {
                                log::trace!("Ignoring: {}", path.display());
                            }
                            !ignored
                        }
                        Err(_) => true,
                    });
                }
                children.sort_by(|a, b| match (a, b) {
                    (Ok(a), Ok(b)) => a.file_name().cmp(b.file_name()),
                    (Ok(_), Err(_)) => std::cmp::Ordering::Less,
                    (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
                    (Err(_), Err(_)) => std::cmp::Ordering::Equal,
                });
            });

        walk_dir.into_iter().filter_map(move |entry_result| {
            if self.is_shutdown_requested() {
                log::debug!("Walker: shutdown requested, stopping iteration");
                return None;
            }

            let entry = match entry_result {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e
                        .path()
                        .map_or_else(|| self.root.clone(), Path::to_path_buf);
                    log::warn!("Walker error for {}: {}", path.display(), e);
                    let kind = e
                        .io_error()
                        .map_or(std::io::ErrorKind::Other, std::io::Error::kind);
                    return Some(Err(ScanError::from_io(
                        &path,
                        std::io::Error::new(kind, e.to_string()),
                    )));
                }
            };

            // Cheap pre-filter on the dirent type; symlinks and directories
            // never reach the metadata call.
            let file_type = entry.file_type();
            if !file_type.is_file() {
                return None;
            }

            let path = entry.path();
            match std::fs::symlink_metadata(&path) {
                Ok(metadata) => self.accept(path, &metadata, tracker),
                Err(e) => {
                    log::warn!("Cannot read metadata for {}: {}", path.display(), e);
                    Some(Err(ScanError::from_io(&path, e)))
                }
            }
        })
    }

    fn accept(
        &self,
        path: PathBuf,
        metadata: &Metadata,
        tracker: &mut HardlinkTracker,
    ) -> Option<Result<FileEntry, ScanError>> {
        if !metadata.is_file() {
            return None;
        }

        let size = metadata.len();
        if !self.passes_size_filter(size) {
            log::trace!("Skipping file due to size filter ({size}): {}", path.display());
            return None;
        }

        if tracker.is_hardlink(metadata) {
            log::debug!("Skipping already-seen inode: {}", path.display());
            return None;
        }

        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        Some(Ok(FileEntry::new(path, size, modified)))
    }
}
