//! Memoized hidden/visible decisions for mount-relative paths.
//!
//! # Overview
//!
//! Hashing is the dominant cost of every filesystem call, and the kernel
//! typically issues an attribute lookup, an open and several reads against
//! the same path in quick succession. [`MatchCache`] therefore computes a
//! verdict at most once per regular file and reuses it for the lifetime of
//! the process. Underlying files are assumed not to change while mounted, so
//! there is no invalidation or eviction.
//!
//! # Locking
//!
//! The path map lock is only held long enough to find or insert a
//! [`VerdictSlot`]. Hashing runs under the slot's own lock, so a lookup of an
//! already-decided path never waits behind hashing of a different path.
//!
//! # What is cached
//!
//! * Regular files: the first verdict is stored and never recomputed. A file
//!   that cannot be read (permission denied) is stored as visible.
//! * Anything else (directories, symlinks, devices): always visible, never
//!   stored, since only regular file content is ever hashed.
//! * Other I/O errors while hashing are returned and not stored; the next
//!   lookup retries.

pub mod entry;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::index::HashIndex;
use crate::matcher::{matches, MatchPolicy};
use crate::scanner::{HashError, Hasher, HostStore};

pub use entry::{Verdict, VerdictSlot};

/// Shared per-path verdict cache.
pub struct MatchCache {
    store: Arc<dyn HostStore>,
    index: Arc<HashIndex>,
    policy: MatchPolicy,
    hasher: Hasher,
    slots: Mutex<HashMap<PathBuf, Arc<VerdictSlot>>>,
    hashes_computed: AtomicU64,
}

impl std::fmt::Debug for MatchCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchCache")
            .field("store", &"<store>")
            .field("index_len", &self.index.len())
            .field("policy", &self.policy)
            .field("hasher", &self.hasher)
            .field("hashes_computed", &self.hashes_computed())
            .finish()
    }
}

impl MatchCache {
    /// Create an empty cache over `store`.
    #[must_use]
    pub fn new(
        store: Arc<dyn HostStore>,
        index: Arc<HashIndex>,
        policy: MatchPolicy,
        hasher: Hasher,
    ) -> Self {
        Self {
            store,
            index,
            policy,
            hasher,
            slots: Mutex::new(HashMap::new()),
            hashes_computed: AtomicU64::new(0),
        }
    }

    /// Configured match policy.
    #[must_use]
    pub fn policy(&self) -> MatchPolicy {
        self.policy
    }

    /// Whether `path` must be hidden from the mount.
    ///
    /// The first call for a regular file hashes its content and stores the
    /// verdict; later calls answer from the cache without touching the host.
    ///
    /// # Arguments
    ///
    /// * `path` - Mount-relative, `/`-rooted path (e.g. `/reports/q1.csv`)
    ///
    /// # Returns
    ///
    /// `true` if the content hash is listed and one of its reference paths
    /// satisfies the match policy. Non-regular files and files that cannot be
    /// read for lack of permission are reported visible (`false`).
    ///
    /// # Errors
    ///
    /// [`HashError::NotFound`] if the path does not exist, [`HashError::Io`]
    /// for I/O failures other than permission denial.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use hffs::cache::MatchCache;
    /// use hffs::index::HashIndex;
    /// use hffs::matcher::MatchPolicy;
    /// use hffs::scanner::{Hasher, LocalStore};
    /// use std::path::Path;
    /// use std::sync::Arc;
    ///
    /// let index = HashIndex::load(Path::new("hashes.txt")).unwrap();
    /// let cache = MatchCache::new(
    ///     Arc::new(LocalStore::new("/data")),
    ///     Arc::new(index),
    ///     MatchPolicy::File,
    ///     Hasher::new(),
    /// );
    /// if cache.is_hidden(Path::new("/secret.txt")).unwrap() {
    ///     println!("hidden");
    /// }
    /// ```
    pub fn is_hidden(&self, path: &Path) -> Result<bool, HashError> {
        if let Some(verdict) = self.cached(path) {
            return Ok(verdict.is_hidden());
        }

        let metadata = match self.store.metadata(path) {
            Ok(metadata) => metadata,
            Err(e) => match HashError::from_io(path, e) {
                HashError::PermissionDenied(_) => {
                    log::warn!("Cannot stat {}, treating as visible", path.display());
                    return Ok(false);
                }
                other => return Err(other),
            },
        };
        if !metadata.is_file() {
            return Ok(false);
        }

        let slot = self.slot(path);
        let verdict = slot.get_or_try_compute(|| match self.evaluate(path) {
            Err(HashError::PermissionDenied(_)) => {
                log::warn!("Cannot read {}, treating as visible", path.display());
                Ok(Verdict::Visible)
            }
            result => result,
        })?;
        Ok(verdict.is_hidden())
    }

    /// Verdict already stored for `path`, without touching the host.
    #[must_use]
    pub fn cached(&self, path: &Path) -> Option<Verdict> {
        let slot = self.slots.lock().get(path).cloned()?;
        slot.get()
    }

    /// Number of paths with a stored verdict.
    #[must_use]
    pub fn cached_len(&self) -> usize {
        // Clone the slots out so no slot lock is taken while the map is locked.
        let slots: Vec<Arc<VerdictSlot>> = self.slots.lock().values().cloned().collect();
        slots.iter().filter(|slot| slot.get().is_some()).count()
    }

    /// Number of completed hashing passes.
    #[must_use]
    pub fn hashes_computed(&self) -> u64 {
        self.hashes_computed.load(Ordering::Relaxed)
    }

    fn slot(&self, path: &Path) -> Arc<VerdictSlot> {
        let mut slots = self.slots.lock();
        Arc::clone(slots.entry(path.to_path_buf()).or_default())
    }

    /// Hash `path` and test it against every reference path for that hash.
    fn evaluate(&self, path: &Path) -> Result<Verdict, HashError> {
        let digest = self.hasher.hash_file(self.store.as_ref(), path)?;
        self.hashes_computed.fetch_add(1, Ordering::Relaxed);

        let matched = self
            .index
            .paths_for(&digest)
            .and_then(|refs| refs.iter().find(|r| matches(path, r, self.policy)));

        match matched {
            Some(reference) => {
                log::debug!(
                    "Hiding {} (hash {} matches {} under policy {})",
                    path.display(),
                    digest,
                    reference,
                    self.policy
                );
                Ok(Verdict::Hidden)
            }
            None => Ok(Verdict::Visible),
        }
    }
}
