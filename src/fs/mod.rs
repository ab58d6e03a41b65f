//! Read-only passthrough filesystem that hides hash-listed files.
//!
//! # Overview
//!
//! [`FilterFs`] is the set of operations the mount exposes. Every path-keyed
//! call first asks the [`MatchCache`] whether the path is hidden; hidden paths
//! are reported as [`FsError::NotFound`], exactly like a file that does not
//! exist. Visible paths are forwarded unchanged to the [`HostStore`].
//! Every mutating operation fails with [`FsError::ReadOnly`].
//!
//! The operations here are independent of the kernel protocol; [`fuse`]
//! binds them to `fuser`.
//!
//! # Example
//!
//! ```no_run
//! use hffs::fs::FilterFs;
//! use hffs::index::HashIndex;
//! use hffs::matcher::MatchPolicy;
//! use hffs::scanner::{Hasher, LocalStore};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! let index = HashIndex::load(Path::new("hashes.txt")).unwrap();
//! let fs = FilterFs::new(
//!     Arc::new(LocalStore::new("/data")),
//!     Arc::new(index),
//!     MatchPolicy::File,
//!     Hasher::new(),
//! );
//! for entry in fs.readdir(Path::new("/")).unwrap() {
//!     println!("{}", entry.name.to_string_lossy());
//! }
//! ```

pub mod fuse;
pub mod inode;

use std::collections::HashMap;
use std::ffi::OsString;
use std::fs::{File, FileType, Metadata};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::cache::MatchCache;
use crate::index::HashIndex;
use crate::matcher::MatchPolicy;
use crate::scanner::{HashError, Hasher, HostStore};

/// Result type for filesystem operations.
pub type FsResult<T> = Result<T, FsError>;

/// Errors returned by [`FilterFs`] operations.
#[derive(thiserror::Error, Debug)]
pub enum FsError {
    /// The path does not exist or is hidden.
    #[error("Not found: {0}")]
    NotFound(PathBuf),

    /// The host refused access.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// A mutating operation was attempted.
    #[error("Read-only filesystem")]
    ReadOnly,

    /// The file handle is not open.
    #[error("Bad file handle: {0}")]
    BadHandle(u64),

    /// Any other host I/O failure.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },
}

impl FsError {
    /// Classify a host I/O error for `path`.
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

    /// errno reported to the kernel.
    #[must_use]
    pub fn errno(&self) -> i32 {
        match self {
            Self::NotFound(_) => libc::ENOENT,
            Self::PermissionDenied(_) => libc::EACCES,
            Self::ReadOnly => libc::EROFS,
            Self::BadHandle(_) => libc::EBADF,
            Self::Io { source, .. } => source.raw_os_error().unwrap_or(libc::EIO),
        }
    }
}

impl From<HashError> for FsError {
    fn from(err: HashError) -> Self {
        match err {
            HashError::NotFound(path) => Self::NotFound(path),
            HashError::PermissionDenied(path) => Self::PermissionDenied(path),
            HashError::Io { path, source } => Self::Io { path, source },
        }
    }
}

/// A visible entry of a directory listing.
#[derive(Debug, Clone)]
pub struct DirEntry {
    /// Entry name within its directory.
    pub name: OsString,
    /// Host file type of the entry.
    pub file_type: FileType,
}

struct OpenFile {
    path: PathBuf,
    file: File,
}

/// Filtered, read-only view over a [`HostStore`].
pub struct FilterFs {
    store: Arc<dyn HostStore>,
    cache: MatchCache,
    handles: Mutex<HashMap<u64, Arc<OpenFile>>>,
    next_handle: AtomicU64,
}

impl std::fmt::Debug for FilterFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterFs")
            .field("cache", &self.cache)
            .field("open_handles", &self.open_handles())
            .finish()
    }
}

impl FilterFs {
    /// Build the filesystem over `store`, hiding files listed in `index`.
    #[must_use]
    pub fn new(
        store: Arc<dyn HostStore>,
        index: Arc<HashIndex>,
        policy: MatchPolicy,
        hasher: Hasher,
    ) -> Self {
        let cache = MatchCache::new(Arc::clone(&store), index, policy, hasher);
        Self {
            store,
            cache,
            handles: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    /// The verdict cache backing this filesystem.
    #[must_use]
    pub fn cache(&self) -> &MatchCache {
        &self.cache
    }

    /// Number of handles currently open.
    #[must_use]
    pub fn open_handles(&self) -> usize {
        self.handles.lock().len()
    }

    fn ensure_visible(&self, path: &Path) -> FsResult<()> {
        if self.cache.is_hidden(path)? {
            log::trace!("{} is hidden", path.display());
            return Err(FsError::NotFound(path.to_path_buf()));
        }
        Ok(())
    }

    /// Host metadata for a visible path.
    pub fn attributes(&self, path: &Path) -> FsResult<Metadata> {
        self.ensure_visible(path)?;
        self.store
            .metadata(path)
            .map_err(|e| FsError::from_io(path, e))
    }

    /// Open a visible path and return a handle for [`FilterFs::read`].
    ///
    /// The host file is always opened read-only; `flags` are only logged.
    pub fn open(&self, path: &Path, flags: i32) -> FsResult<u64> {
        self.ensure_visible(path)?;
        let file = self.store.open(path).map_err(|e| FsError::from_io(path, e))?;
        let fh = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.handles.lock().insert(
            fh,
            Arc::new(OpenFile {
                path: path.to_path_buf(),
                file,
            }),
        );
        log::trace!("open {} flags={:#o} -> fh {}", path.display(), flags, fh);
        Ok(fh)
    }

    /// Read up to `size` bytes at `offset`. Short only at end of file.
    pub fn read(&self, fh: u64, size: usize, offset: u64) -> FsResult<Vec<u8>> {
        let open = self
            .handles
            .lock()
            .get(&fh)
            .cloned()
            .ok_or(FsError::BadHandle(fh))?;

        let mut buf = vec![0u8; size];
        let mut filled = 0;
        while filled < size {
            match open.file.read_at(&mut buf[filled..], offset + filled as u64) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(FsError::from_io(&open.path, e)),
            }
        }
        buf.truncate(filled);
        Ok(buf)
    }

    /// Close a handle returned by [`FilterFs::open`].
    pub fn release(&self, fh: u64) -> FsResult<()> {
        match self.handles.lock().remove(&fh) {
            Some(open) => {
                log::trace!("release fh {} ({})", fh, open.path.display());
                Ok(())
            }
            None => Err(FsError::BadHandle(fh)),
        }
    }

    /// Visible entries of the directory at `path`, in host order.
    ///
    /// Each child is stat'ed once for its file type, then checked against the
    /// cache. Hidden children are left out exactly as if they did not exist.
    ///
    /// # Arguments
    ///
    /// * `path` - Mount-relative directory path, `/` for the mount root
    ///
    /// # Returns
    ///
    /// The visible children, without `.` and `..`. A child that vanishes
    /// during the listing is skipped, and so is a child whose metadata cannot
    /// be read for lack of permission, since its type is unknown.
    ///
    /// # Errors
    ///
    /// [`FsError::NotFound`] if `path` is missing or hidden, otherwise the
    /// host error for the directory or for a child that failed to hash.
    pub fn readdir(&self, path: &Path) -> FsResult<Vec<DirEntry>> {
        self.ensure_visible(path)?;
        let names = self
            .store
            .read_dir(path)
            .map_err(|e| FsError::from_io(path, e))?;

        let mut entries = Vec::with_capacity(names.len());
        for name in names {
            let child = path.join(&name);
            let metadata = match self.store.metadata(&child) {
                Ok(metadata) => metadata,
                Err(e) => match e.kind() {
                    io::ErrorKind::NotFound => continue,
                    io::ErrorKind::PermissionDenied => {
                        log::warn!("Cannot stat {}, leaving it out of the listing", child.display());
                        continue;
                    }
                    _ => return Err(FsError::from_io(&child, e)),
                },
            };
            match self.cache.is_hidden(&child) {
                Ok(true) | Err(HashError::NotFound(_)) => continue,
                Ok(false) => entries.push(DirEntry {
                    name,
                    file_type: metadata.file_type(),
                }),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(entries)
    }

    /// Target of the symlink at `path`.
    pub fn readlink(&self, path: &Path) -> FsResult<PathBuf> {
        self.ensure_visible(path)?;
        self.store
            .read_link(path)
            .map_err(|e| FsError::from_io(path, e))
    }

    fn reject(&self, op: &str, path: &Path) -> FsResult<()> {
        log::debug!("Rejected {} on {}", op, path.display());
        Err(FsError::ReadOnly)
    }

    /// Always fails with [`FsError::ReadOnly`].
    pub fn chmod(&self, path: &Path, _mode: u32) -> FsResult<()> {
        self.reject("chmod", path)
    }

    /// Always fails with [`FsError::ReadOnly`].
    pub fn chown(&self, path: &Path, _uid: Option<u32>, _gid: Option<u32>) -> FsResult<()> {
        self.reject("chown", path)
    }

    /// Always fails with [`FsError::ReadOnly`].
    pub fn link(&self, _target: &Path, link_path: &Path) -> FsResult<()> {
        self.reject("link", link_path)
    }

    /// Always fails with [`FsError::ReadOnly`].
    pub fn mkdir(&self, path: &Path, _mode: u32) -> FsResult<()> {
        self.reject("mkdir", path)
    }

    /// Always fails with [`FsError::ReadOnly`].
    pub fn rename(&self, from: &Path, _to: &Path) -> FsResult<()> {
        self.reject("rename", from)
    }

    /// Always fails with [`FsError::ReadOnly`].
    pub fn rmdir(&self, path: &Path) -> FsResult<()> {
        self.reject("rmdir", path)
    }

    /// Always fails with [`FsError::ReadOnly`].
    pub fn symlink(&self, _target: &Path, link_path: &Path) -> FsResult<()> {
        self.reject("symlink", link_path)
    }

    /// Always fails with [`FsError::ReadOnly`].
    pub fn unlink(&self, path: &Path) -> FsResult<()> {
        self.reject("unlink", path)
    }
}
