//! Hash list loading.
//!
//! The hash list is a plain text file with one `<hexHash> <path>` record per
//! line. Tokens after the second are ignored. The same hash may appear on
//! several lines; its reference paths are kept in input order.
//!
//! # Example
//!
//! ```
//! use hffs::index::HashIndex;
//!
//! let index = HashIndex::parse("ABC123 ./data/secret.txt\nabc123 other.txt\n").unwrap();
//! assert_eq!(
//!     index.paths_for("abc123").unwrap(),
//!     &["/data/secret.txt".to_string(), "/other.txt".to_string()]
//! );
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::ConfigError;

/// Mapping from content hash to the reference paths that carry it.
///
/// Built once at startup and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashIndex {
    entries: HashMap<String, Vec<String>>,
}

impl HashIndex {
    /// Load a hash list from a file.
    ///
    /// The whole file is read and parsed up front; a single bad line rejects
    /// the list so that nothing is mounted with a partial index.
    ///
    /// # Arguments
    ///
    /// * `path` - Hash list with one `<hexHash> <path>` record per line
    ///
    /// # Returns
    ///
    /// The index keyed by lower-case hash, each hash mapped to its
    /// normalized reference paths in file order.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::ReadHashList`] if the file cannot be read
    /// - [`ConfigError::MalformedLine`] if any line has a single token
    ///
    /// # Example
    ///
    /// ```no_run
    /// use hffs::index::HashIndex;
    /// use std::path::Path;
    ///
    /// let index = HashIndex::load(Path::new("hashes.txt")).unwrap();
    /// println!("{} distinct hashes", index.len());
    /// ```
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::ReadHashList {
            path: path.to_path_buf(),
            source,
        })?;
        let index = Self::parse(&content)?;
        log::info!(
            "Loaded {} hashes ({} reference paths) from {}",
            index.len(),
            index.reference_count(),
            path.display()
        );
        Ok(index)
    }

    /// Parse hash list text.
    ///
    /// Whitespace-only lines are skipped. Hashes are lower-cased.
    ///
    /// # Errors
    ///
    /// [`ConfigError::MalformedLine`] with the 1-based line number of the first
    /// line that has a hash but no path.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let mut entries: HashMap<String, Vec<String>> = HashMap::new();

        for (idx, line) in content.lines().enumerate() {
            let mut tokens = line.split_whitespace();
            let Some(hash) = tokens.next() else {
                continue;
            };
            let Some(path) = tokens.next() else {
                return Err(ConfigError::MalformedLine {
                    line: idx + 1,
                    content: line.to_string(),
                });
            };

            entries
                .entry(hash.to_ascii_lowercase())
                .or_default()
                .push(normalize_reference_path(path));
        }

        Ok(Self { entries })
    }

    /// Reference paths recorded for `hash`, in input order.
    #[must_use]
    pub fn paths_for(&self, hash: &str) -> Option<&[String]> {
        self.entries.get(hash).map(Vec::as_slice)
    }

    /// Whether `hash` appears in the list.
    #[must_use]
    pub fn contains(&self, hash: &str) -> bool {
        self.entries.contains_key(hash)
    }

    /// Number of distinct hashes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the list had no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of reference paths across all hashes.
    #[must_use]
    pub fn reference_count(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }
}

/// Normalize a hash list path to begin with exactly one `/`.
///
/// Leading `./` markers are stripped first, so `./a/b`, `a/b` and `//a/b`
/// all become `/a/b`.
#[must_use]
pub fn normalize_reference_path(raw: &str) -> String {
    let mut rest = raw;
    loop {
        if let Some(stripped) = rest.strip_prefix("./") {
            rest = stripped;
        } else if rest == "." {
            rest = "";
        } else if let Some(stripped) = rest.strip_prefix('/') {
            rest = stripped;
        } else {
            break;
        }
    }
    format!("/{rest}")
}
