//! Helpers shared by integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use cowdupe::platform::CloneBackend;

/// Stands in for reflinks on filesystems without them: a byte copy has the
/// same observable contents as a clone.
#[derive(Debug, Default, Clone, Copy)]
pub struct CopyBackend;

impl CloneBackend for CopyBackend {
    fn name(&self) -> &'static str {
        "copy"
    }

    fn clone_file(&self, source: &Path, dest: &Path) -> io::Result<()> {
        let mut out = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(dest)?;
        io::copy(&mut fs::File::open(source)?, &mut out)?;
        Ok(())
    }
}

/// Byte-copying backend that remembers which files were cloned from which.
///
/// Clone families are keyed by (device, inode), which survives the rename
/// over the duplicate. Two files share data when they belong to the same
/// family, so a second pass over the same tree sees every replaced pair as
/// already shared. Clones share state, so one backend can serve several
/// executors.
#[cfg(unix)]
#[derive(Debug, Default, Clone)]
pub struct TrackingBackend {
    families: Arc<Mutex<HashMap<(u64, u64), (u64, u64)>>>,
    clones: Arc<Mutex<Vec<(PathBuf, PathBuf)>>>,
}

#[cfg(unix)]
impl TrackingBackend {
    /// Every (source, destination) pair cloned so far.
    pub fn clones(&self) -> Vec<(PathBuf, PathBuf)> {
        self.clones.lock().unwrap().clone()
    }

    fn file_id(path: &Path) -> io::Result<(u64, u64)> {
        use std::os::unix::fs::MetadataExt;
        let meta = fs::symlink_metadata(path)?;
        Ok((meta.dev(), meta.ino()))
    }

    fn family(&self, id: (u64, u64)) -> (u64, u64) {
        self.families.lock().unwrap().get(&id).copied().unwrap_or(id)
    }
}

#[cfg(unix)]
impl CloneBackend for TrackingBackend {
    fn name(&self) -> &'static str {
        "tracking"
    }

    fn clone_file(&self, source: &Path, dest: &Path) -> io::Result<()> {
        CopyBackend.clone_file(source, dest)?;
        let family = self.family(Self::file_id(source)?);
        let dest_id = Self::file_id(dest)?;
        self.families.lock().unwrap().insert(dest_id, family);
        self.clones
            .lock()
            .unwrap()
            .push((source.to_path_buf(), dest.to_path_buf()));
        Ok(())
    }

    fn shares_data(&self, a: &Path, b: &Path) -> io::Result<bool> {
        Ok(self.family(Self::file_id(a)?) == self.family(Self::file_id(b)?))
    }
}

/// Write `content` to `dir/name`, creating parent directories.
pub fn write_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

/// Names of leftover temporary clones under `dir`.
pub fn temp_leftovers(dir: &Path) -> Vec<String> {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(Result::ok)
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with(".cowdupe-"))
        .collect()
}
