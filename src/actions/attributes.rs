//! Capture and restore of per-file metadata.
//!
//! A clone inherits the master's metadata, not the duplicate's. Before a
//! duplicate is replaced its attributes are captured; afterwards they are
//! written onto the clone so that, apart from sharing storage, the file
//! looks exactly as it did before.
//!
//! Restored, in order:
//! - extended attributes (Unix)
//! - owner and group (Unix, only when they differ)
//! - permission bits
//! - access and modification times (last, since the other steps touch them)

use std::ffi::OsString;
use std::fs::{self, Permissions};
use std::io;
use std::path::{Path, PathBuf};

use filetime::FileTime;

/// Failure to read or write a single attribute.
#[derive(thiserror::Error, Debug)]
pub enum AttributeError {
    /// The original metadata could not be read.
    #[error("failed to read attributes of {path}: {source}")]
    Capture {
        /// File being inspected
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// An attribute could not be applied to the replacement.
    #[error("failed to restore {attribute} on {path}: {source}")]
    Restore {
        /// File being updated
        path: PathBuf,
        /// Which attribute failed
        attribute: &'static str,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },
}

/// Metadata snapshot of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAttributes {
    /// Size in bytes at capture time
    pub len: u64,
    /// Number of hard links to the inode
    pub links: u64,
    /// Permission bits
    pub permissions: Permissions,
    /// Last access time
    pub accessed: FileTime,
    /// Last modification time
    pub modified: FileTime,
    /// Owning user id
    #[cfg(unix)]
    pub uid: u32,
    /// Owning group id
    #[cfg(unix)]
    pub gid: u32,
    /// Extended attributes as (name, value) pairs
    pub xattrs: Vec<(OsString, Vec<u8>)>,
}

impl FileAttributes {
    /// Snapshot the metadata of `path` without following symlinks.
    ///
    /// # Errors
    ///
    /// Returns [`AttributeError::Capture`] if the metadata or extended
    /// attributes cannot be read. Filesystems without xattr support yield an
    /// empty xattr list rather than an error.
    pub fn capture(path: &Path) -> Result<Self, AttributeError> {
        let capture_err = |source| AttributeError::Capture {
            path: path.to_path_buf(),
            source,
        };

        let metadata = fs::symlink_metadata(path).map_err(capture_err)?;
        let xattrs = read_xattrs(path).map_err(capture_err)?;

        #[cfg(unix)]
        let (uid, gid, links) = {
            use std::os::unix::fs::MetadataExt;
            (metadata.uid(), metadata.gid(), metadata.nlink())
        };
        #[cfg(not(unix))]
        let links = 1;

        Ok(Self {
            len: metadata.len(),
            links,
            permissions: metadata.permissions(),
            accessed: FileTime::from_last_access_time(&metadata),
            modified: FileTime::from_last_modification_time(&metadata),
            #[cfg(unix)]
            uid,
            #[cfg(unix)]
            gid,
            xattrs,
        })
    }

    /// Apply this snapshot to `path`.
    ///
    /// Every attribute is attempted even if an earlier one fails. The
    /// returned list is empty when everything was restored.
    #[must_use]
    pub fn restore(&self, path: &Path) -> Vec<AttributeError> {
        let mut failures = Vec::new();
        let mut record = |attribute: &'static str, result: io::Result<()>| {
            if let Err(source) = result {
                failures.push(AttributeError::Restore {
                    path: path.to_path_buf(),
                    attribute,
                    source,
                });
            }
        };

        record("extended attributes", write_xattrs(path, &self.xattrs));
        #[cfg(unix)]
        record("ownership", self.restore_ownership(path));
        record(
            "permissions",
            fs::set_permissions(path, self.permissions.clone()),
        );
        record(
            "timestamps",
            filetime::set_file_times(path, self.accessed, self.modified),
        );

        failures
    }

    #[cfg(unix)]
    fn restore_ownership(&self, path: &Path) -> io::Result<()> {
        use std::os::unix::fs::MetadataExt;

        let current = fs::symlink_metadata(path)?;
        if current.uid() == self.uid && current.gid() == self.gid {
            return Ok(());
        }
        std::os::unix::fs::chown(path, Some(self.uid), Some(self.gid))
    }
}

#[cfg(unix)]
fn xattrs_unsupported(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::Unsupported
        || err.raw_os_error() == Some(libc::ENOTSUP)
        || err.raw_os_error() == Some(libc::EOPNOTSUPP)
}

#[cfg(unix)]
fn read_xattrs(path: &Path) -> io::Result<Vec<(OsString, Vec<u8>)>> {
    let names = match xattr::list(path) {
        Ok(names) => names,
        Err(e) if xattrs_unsupported(&e) => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut attrs = Vec::new();
    for name in names {
        if let Some(value) = xattr::get(path, &name)? {
            attrs.push((name, value));
        }
    }
    attrs.sort();
    Ok(attrs)
}

#[cfg(not(unix))]
fn read_xattrs(_path: &Path) -> io::Result<Vec<(OsString, Vec<u8>)>> {
    Ok(Vec::new())
}

/// Make the xattr set of `path` exactly `attrs`.
#[cfg(unix)]
fn write_xattrs(path: &Path, attrs: &[(OsString, Vec<u8>)]) -> io::Result<()> {
    let existing: Vec<OsString> = match xattr::list(path) {
        Ok(names) => names.collect(),
        Err(e) if xattrs_unsupported(&e) && attrs.is_empty() => return Ok(()),
        Err(e) => return Err(e),
    };

    for name in existing {
        if !attrs.iter().any(|(keep, _)| *keep == name) {
            xattr::remove(path, &name)?;
        }
    }
    for (name, value) in attrs {
        xattr::set(path, name, value)?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn write_xattrs(_path: &Path, _attrs: &[(OsString, Vec<u8>)]) -> io::Result<()> {
    Ok(())
}
