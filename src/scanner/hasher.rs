//! Streaming SHA-256 content hashing.
//!
//! Files are read in bounded chunks so that arbitrarily large files hash in
//! constant memory. The read buffer is sized to `min(chunk_size, file_size)`
//! so small files don't pay for a full chunk allocation.
//!
//! A shutdown request is honoured at chunk boundaries and surfaces as
//! [`HashError::Interrupted`].

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sha2::{Digest as _, Sha256};

use super::HashError;

/// Default read chunk: 100 MB per read call.
pub const DEFAULT_CHUNK_SIZE: usize = 100_000_000;

/// A 32-byte SHA-256 digest of a file's full contents.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest([u8; 32]);

impl Digest {
    /// Wrap raw digest bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex rendering, 64 characters.
    #[must_use]
    pub fn to_hex(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({self})")
    }
}

/// Chunked SHA-256 file hasher.
#[derive(Debug, Clone)]
pub struct Hasher {
    chunk_size: usize,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher {
    /// Create a hasher reading [`DEFAULT_CHUNK_SIZE`] bytes per call.
    #[must_use]
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            shutdown_flag: None,
        }
    }

    /// Set the read chunk size. Zero is clamped to one byte.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Stop hashing at the next chunk boundary once `flag` is set.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Configured chunk size in bytes.
    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Compute the SHA-256 digest of the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns a [`HashError`] if the file cannot be opened or read, or if
    /// shutdown was requested mid-file.
    pub fn hash(&self, path: &Path) -> Result<Digest, HashError> {
        let file = File::open(path).map_err(|e| HashError::from_io(path, e))?;
        let len = file
            .metadata()
            .map_err(|e| HashError::from_io(path, e))?
            .len();
        let buffer_len = usize::try_from(len)
            .unwrap_or(usize::MAX)
            .clamp(1, self.chunk_size);
        self.hash_reader(file, path, buffer_len)
    }

    /// Hash an arbitrary reader with a buffer of `buffer_len` bytes.
    ///
    /// `path` is only used for error reporting.
    ///
    /// # Errors
    ///
    /// Returns a [`HashError`] on read failure or shutdown.
    pub fn hash_reader<R: Read>(
        &self,
        mut reader: R,
        path: &Path,
        buffer_len: usize,
    ) -> Result<Digest, HashError> {
        let mut state = Sha256::new();
        let mut buffer = vec![0u8; buffer_len.max(1)];

        loop {
            if self.is_shutdown_requested() {
                log::debug!("Hashing interrupted: {}", path.display());
                return Err(HashError::Interrupted(path.to_path_buf()));
            }
            match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => state.update(&buffer[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(HashError::from_io(path, e)),
            }
        }

        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&state.finalize());
        Ok(Digest(bytes))
    }
}
