//! Inode number assignment for mount-relative paths.
//!
//! The kernel addresses files by inode; [`FilterFs`](super::FilterFs) works on
//! paths. Numbers are handed out on first sight and never reused.
//!
//! Entries handed to the kernel through `lookup` carry a reference count.
//! When the kernel forgets every reference, the entry is dropped; a later
//! lookup of the same path gets a fresh number.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Inode of the mount root.
pub const ROOT_INO: u64 = 1;

/// Bidirectional inode/path map.
#[derive(Debug)]
pub struct InodeTable {
    paths: HashMap<u64, PathBuf>,
    inodes: HashMap<PathBuf, u64>,
    lookups: HashMap<u64, u64>,
    next: u64,
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl InodeTable {
    /// Table containing only the root (`/` → [`ROOT_INO`]).
    #[must_use]
    pub fn new() -> Self {
        let root = PathBuf::from("/");
        let mut paths = HashMap::new();
        let mut inodes = HashMap::new();
        paths.insert(ROOT_INO, root.clone());
        inodes.insert(root, ROOT_INO);
        Self {
            paths,
            inodes,
            lookups: HashMap::new(),
            next: ROOT_INO + 1,
        }
    }

    /// Path for `ino`, if it has been assigned.
    #[must_use]
    pub fn path(&self, ino: u64) -> Option<&Path> {
        self.paths.get(&ino).map(PathBuf::as_path)
    }

    /// Inode for `path`, assigning a fresh one if needed.
    pub fn get_or_insert(&mut self, path: &Path) -> u64 {
        if let Some(&ino) = self.inodes.get(path) {
            return ino;
        }
        let ino = self.next;
        self.next += 1;
        self.paths.insert(ino, path.to_path_buf());
        self.inodes.insert(path.to_path_buf(), ino);
        ino
    }

    /// Inode for `path`, counting one kernel reference to it.
    pub fn lookup(&mut self, path: &Path) -> u64 {
        let ino = self.get_or_insert(path);
        *self.lookups.entry(ino).or_insert(0) += 1;
        ino
    }

    /// Drop `nlookup` kernel references to `ino`.
    ///
    /// The entry is removed once no references remain. The root is never
    /// removed, and neither are entries the kernel never looked up.
    ///
    /// # Returns
    ///
    /// `true` if the entry was removed.
    pub fn forget(&mut self, ino: u64, nlookup: u64) -> bool {
        if ino == ROOT_INO {
            return false;
        }
        let Some(count) = self.lookups.get_mut(&ino) else {
            return false;
        };
        *count = count.saturating_sub(nlookup);
        if *count > 0 {
            return false;
        }
        self.lookups.remove(&ino);
        if let Some(path) = self.paths.remove(&ino) {
            self.inodes.remove(&path);
        }
        true
    }

    /// Inode of the directory containing `path` (the root is its own parent).
    pub fn parent_of(&mut self, path: &Path) -> u64 {
        match path.parent() {
            Some(parent) => self.get_or_insert(parent),
            None => ROOT_INO,
        }
    }

    /// Number of known inodes, including the root.
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Always false: the root is present from construction.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}
