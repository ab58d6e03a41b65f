//! Path comparison policies applied after a content hash hit.

use std::ffi::OsStr;
use std::path::Path;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// How a candidate path must relate to a hash list path to count as a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "camelCase")]
pub enum MatchPolicy {
    /// Hash equality alone is enough.
    None,
    /// File names must be equal.
    #[default]
    File,
    /// Full mount-relative paths must be equal.
    #[value(name = "fullPath", alias = "full-path")]
    FullPath,
}

impl std::fmt::Display for MatchPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchPolicy::None => write!(f, "none"),
            MatchPolicy::File => write!(f, "file"),
            MatchPolicy::FullPath => write!(f, "fullPath"),
        }
    }
}

/// Decide whether `candidate` and `reference` name the same file under `policy`.
///
/// `candidate` is a mount-relative path such as `/docs/a.txt`; `reference` is a
/// normalized hash list path.
#[must_use]
pub fn matches(candidate: &Path, reference: &str, policy: MatchPolicy) -> bool {
    match policy {
        MatchPolicy::None => true,
        MatchPolicy::FullPath => candidate.as_os_str() == OsStr::new(reference),
        MatchPolicy::File => match (candidate.file_name(), Path::new(reference).file_name()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
    }
}
