//! SHA-256 file hasher with streaming support.
//!
//! # Overview
//! Files are fed to the digest in fixed-size chunks so memory use stays
//! bounded no matter how large the file is. The chunk buffer grows only as
//! far as the data actually read, so small files never allocate a full chunk.

use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use super::{HashError, HostStore};

/// Default read chunk: 32 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 32 * 1024 * 1024;

/// Streaming content hasher producing lower-case hex SHA-256 digests.
#[derive(Debug, Clone, Copy)]
pub struct Hasher {
    chunk_size: usize,
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher {
    /// Create a hasher reading [`DEFAULT_CHUNK_SIZE`] bytes at a time.
    #[must_use]
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Create a hasher with a custom chunk size (minimum 1 byte).
    #[must_use]
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    /// Configured chunk size in bytes.
    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Hash everything `reader` yields.
    ///
    /// # Errors
    ///
    /// Returns the first I/O error raised by the reader. `Interrupted` reads
    /// are retried.
    pub fn hash_reader<R: Read>(&self, mut reader: R) -> std::io::Result<String> {
        let mut digest = Sha256::new();
        let mut buffer = Vec::new();

        loop {
            buffer.clear();
            let read = (&mut reader)
                .take(self.chunk_size as u64)
                .read_to_end(&mut buffer)?;
            if read == 0 {
                break;
            }
            digest.update(&buffer);
        }

        Ok(format!("{:x}", digest.finalize()))
    }

    /// Hash the file at mount-relative `path` in `store`.
    ///
    /// # Errors
    ///
    /// - [`HashError::NotFound`] if the file vanished
    /// - [`HashError::PermissionDenied`] if the file cannot be opened or read
    /// - [`HashError::Io`] for any other failure, including mid-read errors
    pub fn hash_file(&self, store: &dyn HostStore, path: &Path) -> Result<String, HashError> {
        let file = store
            .open(path)
            .map_err(|e| HashError::from_io(path, e))?;
        let digest = self
            .hash_reader(file)
            .map_err(|e| HashError::from_io(path, e))?;
        log::trace!("Hashed {}: {}", path.display(), digest);
        Ok(digest)
    }
}
