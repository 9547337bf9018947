//! Copy-on-write clone primitives.
//!
//! # Platform Support
//!
//! - **Linux**: `FICLONE` ioctl (btrfs, XFS with reflink, bcachefs, ...).
//!   Already-shared files are detected by comparing `FS_IOC_FIEMAP` extent
//!   maps.
//! - **macOS**: `clonefile(2)` (APFS). Already-shared files are detected by
//!   walking both files with `F_LOG2PHYS_EXT` and comparing device offsets.
//! - **Other**: cloning is unavailable and [`ensure_supported`] fails.
//!
//! A clone is always created at a path that does not exist yet. The caller
//! renames it over the duplicate afterwards, so a failed clone never leaves
//! the duplicate missing.

use std::io;
use std::path::Path;

/// Creates copy-on-write clones.
///
/// Implemented by [`ReflinkBackend`] for real filesystems; other
/// implementations can stand in where reflinks are unavailable.
pub trait CloneBackend: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Create `dest` as a clone of `source`.
    ///
    /// `dest` must not exist. On failure `dest` does not exist either.
    ///
    /// # Errors
    ///
    /// Returns the OS error when the filesystem refuses the clone, for
    /// example across devices or on a filesystem without reflink support.
    fn clone_file(&self, source: &Path, dest: &Path) -> io::Result<()>;

    /// Whether `a` and `b` already reference the same physical data.
    ///
    /// # Errors
    ///
    /// Returns an error if either file cannot be inspected.
    fn shares_data(&self, _a: &Path, _b: &Path) -> io::Result<bool> {
        Ok(false)
    }
}

/// Error returned when the host cannot create copy-on-write clones.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("copy-on-write clones are not supported on {os}")]
pub struct CloneUnsupported {
    /// Target operating system name
    pub os: &'static str,
}

/// Whether this build targets an OS with a clone primitive.
#[must_use]
pub const fn is_supported_platform() -> bool {
    cfg!(any(target_os = "linux", target_os = "macos"))
}

/// Fail fast on hosts without a clone primitive.
///
/// # Errors
///
/// Returns [`CloneUnsupported`] on anything but Linux and macOS.
pub fn ensure_supported() -> Result<(), CloneUnsupported> {
    if is_supported_platform() {
        Ok(())
    } else {
        Err(CloneUnsupported {
            os: std::env::consts::OS,
        })
    }
}

/// The host's native clone primitive.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReflinkBackend;

impl CloneBackend for ReflinkBackend {
    fn name(&self) -> &'static str {
        if cfg!(target_os = "macos") {
            "clonefile"
        } else {
            "ficlone"
        }
    }

    fn clone_file(&self, source: &Path, dest: &Path) -> io::Result<()> {
        sys::clone_file(source, dest)
    }

    fn shares_data(&self, a: &Path, b: &Path) -> io::Result<bool> {
        sys::shares_data(a, b)
    }
}

#[cfg(target_os = "linux")]
mod sys {
    use std::fs::{self, File, OpenOptions};
    use std::io;
    use std::os::unix::io::AsRawFd;
    use std::path::Path;

    // _IOW(0x94, 9, int)
    const FICLONE: u64 = 0x4004_9409;
    // _IOWR('f', 11, struct fiemap)
    const FS_IOC_FIEMAP: u64 = 0xC020_660B;

    const FIEMAP_FLAG_SYNC: u32 = 0x0000_0001;
    const FIEMAP_EXTENT_LAST: u32 = 0x0000_0001;
    const FIEMAP_EXTENT_UNKNOWN: u32 = 0x0000_0002;
    const FIEMAP_EXTENT_DELALLOC: u32 = 0x0000_0004;
    const FIEMAP_EXTENT_NOT_ALIGNED: u32 = 0x0000_0100;
    const FIEMAP_EXTENT_DATA_INLINE: u32 = 0x0000_0200;

    const EXTENT_BATCH: usize = 64;
    const MAX_EXTENTS: usize = 1 << 20;

    #[repr(C)]
    #[derive(Clone, Copy, Default)]
    struct FiemapExtent {
        fe_logical: u64,
        fe_physical: u64,
        fe_length: u64,
        fe_reserved64: [u64; 2],
        fe_flags: u32,
        fe_reserved: [u32; 3],
    }

    #[repr(C)]
    struct Fiemap {
        fm_start: u64,
        fm_length: u64,
        fm_flags: u32,
        fm_mapped_extents: u32,
        fm_extent_count: u32,
        fm_reserved: u32,
        fm_extents: [FiemapExtent; EXTENT_BATCH],
    }

    /// One extent reduced to what matters for sharing.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(super) struct Extent {
        logical: u64,
        physical: u64,
        length: u64,
        inline: bool,
    }

    impl Extent {
        /// `None` when the extent has no stable physical address.
        ///
        /// Encoded (compressed) extents keep their physical address. Inline
        /// extents are stored in metadata, so only their position counts.
        pub(super) fn from_raw(
            logical: u64,
            physical: u64,
            length: u64,
            flags: u32,
        ) -> Option<Self> {
            if flags & (FIEMAP_EXTENT_UNKNOWN | FIEMAP_EXTENT_DELALLOC) != 0 {
                return None;
            }
            if flags & FIEMAP_EXTENT_DATA_INLINE != 0 {
                return Some(Self {
                    logical,
                    physical: 0,
                    length,
                    inline: true,
                });
            }
            if flags & FIEMAP_EXTENT_NOT_ALIGNED != 0 {
                return None;
            }
            Some(Self {
                logical,
                physical,
                length,
                inline: false,
            })
        }
    }

    /// Whether two complete extent maps describe the same data.
    pub(super) fn maps_share(a: &[Extent], b: &[Extent]) -> bool {
        !a.is_empty() && a == b
    }

    pub(super) fn clone_file(source: &Path, dest: &Path) -> io::Result<()> {
        let src = File::open(source)?;
        let dst = OpenOptions::new().write(true).create_new(true).open(dest)?;

        // SAFETY: both descriptors are open for the duration of the call and
        // FICLONE takes the source descriptor by value.
        let rc = unsafe { libc::ioctl(dst.as_raw_fd(), FICLONE as _, src.as_raw_fd()) };
        if rc == -1 {
            let err = io::Error::last_os_error();
            drop(dst);
            let _ = fs::remove_file(dest);
            return Err(err);
        }
        Ok(())
    }

    /// Every extent of `file`, or `None` when any extent has no stable
    /// physical address.
    fn extent_map(file: &File) -> io::Result<Option<Vec<Extent>>> {
        let mut extents = Vec::new();
        let mut start = 0u64;

        loop {
            let mut request = Box::new(Fiemap {
                fm_start: start,
                fm_length: u64::MAX - start,
                fm_flags: FIEMAP_FLAG_SYNC,
                fm_mapped_extents: 0,
                fm_extent_count: EXTENT_BATCH as u32,
                fm_reserved: 0,
                fm_extents: [FiemapExtent::default(); EXTENT_BATCH],
            });

            // SAFETY: `request` is a properly sized, writable fiemap buffer
            // with room for `fm_extent_count` extents.
            let rc = unsafe {
                libc::ioctl(
                    file.as_raw_fd(),
                    FS_IOC_FIEMAP as _,
                    &mut *request as *mut Fiemap,
                )
            };
            if rc == -1 {
                return Err(io::Error::last_os_error());
            }

            let mapped = (request.fm_mapped_extents as usize).min(EXTENT_BATCH);
            if mapped == 0 {
                break;
            }

            let mut last = false;
            for extent in &request.fm_extents[..mapped] {
                let Some(entry) = Extent::from_raw(
                    extent.fe_logical,
                    extent.fe_physical,
                    extent.fe_length,
                    extent.fe_flags,
                ) else {
                    return Ok(None);
                };
                extents.push(entry);
                last |= extent.fe_flags & FIEMAP_EXTENT_LAST != 0;
            }

            let tail = request.fm_extents[mapped - 1];
            let next = tail.fe_logical.saturating_add(tail.fe_length);
            if last || next <= start || extents.len() >= MAX_EXTENTS {
                break;
            }
            start = next;
        }

        Ok(Some(extents))
    }

    pub(super) fn shares_data(a: &Path, b: &Path) -> io::Result<bool> {
        let fa = File::open(a)?;
        let fb = File::open(b)?;
        let len = fa.metadata()?.len();
        if len == 0 || len != fb.metadata()?.len() {
            return Ok(false);
        }

        let map_a = match extent_map(&fa) {
            Ok(map) => map,
            Err(e) if e.raw_os_error() == Some(libc::EOPNOTSUPP) => return Ok(false),
            Err(e) => return Err(e),
        };
        let map_b = match extent_map(&fb) {
            Ok(map) => map,
            Err(e) if e.raw_os_error() == Some(libc::EOPNOTSUPP) => return Ok(false),
            Err(e) => return Err(e),
        };

        Ok(match (map_a, map_b) {
            (Some(a), Some(b)) => maps_share(&a, &b),
            _ => false,
        })
    }
}

#[cfg(target_os = "macos")]
mod sys {
    use std::ffi::CString;
    use std::fs::File;
    use std::io;
    use std::os::unix::ffi::OsStrExt;
    use std::os::unix::io::AsRawFd;
    use std::path::Path;

    const MAX_RUNS: usize = 1 << 16;

    pub(super) fn clone_file(source: &Path, dest: &Path) -> io::Result<()> {
        let src = CString::new(source.as_os_str().as_bytes())?;
        let dst = CString::new(dest.as_os_str().as_bytes())?;

        // SAFETY: both pointers are valid NUL-terminated strings that outlive
        // the call.
        let rc = unsafe { libc::clonefile(src.as_ptr(), dst.as_ptr(), 0) };
        if rc == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Device offset of `offset` in `file` and how many bytes from there on
    /// are physically contiguous, looking at most `remaining` bytes ahead.
    fn physical_run(file: &File, offset: u64, remaining: u64) -> io::Result<(i64, u64)> {
        let mut request = libc::log2phys {
            l2p_flags: 0,
            l2p_contigbytes: libc::off_t::try_from(remaining).unwrap_or(libc::off_t::MAX),
            l2p_devoffset: libc::off_t::try_from(offset).unwrap_or(libc::off_t::MAX),
        };

        // SAFETY: `request` is a valid, writable log2phys struct for the
        // duration of the call.
        let rc = unsafe {
            libc::fcntl(
                file.as_raw_fd(),
                libc::F_LOG2PHYS_EXT,
                &mut request as *mut libc::log2phys,
            )
        };
        if rc == -1 {
            return Err(io::Error::last_os_error());
        }

        let device = request.l2p_devoffset;
        let contiguous = u64::try_from(request.l2p_contigbytes).unwrap_or(0);
        Ok((device, contiguous))
    }

    pub(super) fn shares_data(a: &Path, b: &Path) -> io::Result<bool> {
        let fa = File::open(a)?;
        let fb = File::open(b)?;
        let len = fa.metadata()?.len();
        if len == 0 || len != fb.metadata()?.len() {
            return Ok(false);
        }

        let mut offset = 0u64;
        for _ in 0..MAX_RUNS {
            if offset >= len {
                return Ok(true);
            }
            let remaining = len - offset;
            let (dev_a, run_a) = physical_run(&fa, offset, remaining)?;
            let (dev_b, run_b) = physical_run(&fb, offset, remaining)?;
            if dev_a != dev_b {
                return Ok(false);
            }
            let step = run_a.min(run_b);
            if step == 0 {
                return Ok(false);
            }
            offset = offset.saturating_add(step);
        }

        // Too fragmented to walk fully; every run seen so far matched.
        Ok(true)
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
mod sys {
    use std::io;
    use std::path::Path;

    pub(super) fn clone_file(_source: &Path, _dest: &Path) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "copy-on-write clones are not supported on this platform",
        ))
    }

    pub(super) fn shares_data(_a: &Path, _b: &Path) -> io::Result<bool> {
        Ok(false)
    }
}
