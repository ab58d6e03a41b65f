//! Access to the underlying directory tree and content hashing.
//!
//! This module provides:
//! - [`HostStore`]: the narrow capability through which every other module
//!   touches the filtered directory (metadata, open, listing, link targets)
//! - [`LocalStore`]: the real-filesystem implementation rooted at a directory
//! - [`hasher`]: streaming SHA-256 content hashing
//!
//! All paths handed to a [`HostStore`] are mount-relative and `/`-rooted,
//! e.g. `/reports/q1.csv`. The store is responsible for resolving them under
//! its root.
//!
//! # Example
//!
//! ```no_run
//! use hffs::scanner::{HostStore, LocalStore, Hasher};
//! use std::path::Path;
//!
//! let store = LocalStore::new("/data");
//! let digest = Hasher::new().hash_file(&store, Path::new("/secret.txt")).unwrap();
//! println!("{digest}");
//! ```

pub mod hasher;

use std::ffi::OsString;
use std::fs::{self, File, Metadata};
use std::io;
use std::path::{Component, Path, PathBuf};

pub use hasher::{Hasher, DEFAULT_CHUNK_SIZE};

/// Read-only view of the directory tree being filtered.
///
/// Implementations must be shareable across FUSE worker threads.
pub trait HostStore: Send + Sync {
    /// Metadata for `path` without following a final symlink.
    fn metadata(&self, path: &Path) -> io::Result<Metadata>;

    /// Open `path` for reading.
    fn open(&self, path: &Path) -> io::Result<File>;

    /// Entry names of the directory at `path`, in host enumeration order.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<OsString>>;

    /// Target of the symlink at `path`.
    fn read_link(&self, path: &Path) -> io::Result<PathBuf>;
}

/// [`HostStore`] backed by a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Create a store rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The directory this store exposes.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a mount-relative path onto the host filesystem.
    ///
    /// Paths containing `..` are refused so nothing outside the root is reachable.
    fn resolve(&self, path: &Path) -> io::Result<PathBuf> {
        let mut resolved = self.root.clone();
        for component in path.components() {
            match component {
                Component::RootDir | Component::CurDir => {}
                Component::Normal(part) => resolved.push(part),
                Component::ParentDir | Component::Prefix(_) => {
                    return Err(io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("path escapes mount root: {}", path.display()),
                    ));
                }
            }
        }
        Ok(resolved)
    }
}

impl HostStore for LocalStore {
    fn metadata(&self, path: &Path) -> io::Result<Metadata> {
        fs::symlink_metadata(self.resolve(path)?)
    }

    fn open(&self, path: &Path) -> io::Result<File> {
        File::open(self.resolve(path)?)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<OsString>> {
        fs::read_dir(self.resolve(path)?)?
            .map(|entry| entry.map(|e| e.file_name()))
            .collect()
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        fs::read_link(self.resolve(path)?)
    }
}

/// Errors that can occur during file hashing.
#[derive(thiserror::Error, Debug)]
pub enum HashError {
    /// The specified file was not found.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Permission was denied when reading the file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// An I/O error occurred while reading the file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },
}

impl HashError {
    /// Classify an I/O error raised while hashing `path`.
    pub fn from_io(path: &Path, error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: error,
            },
        }
    }
}
