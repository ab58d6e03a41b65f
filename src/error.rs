//! Structured error handling and exit codes.

use serde::Serialize;
use std::path::PathBuf;

/// Exit codes for the hffs binary.
///
/// - 0: Filesystem was mounted and later unmounted normally
/// - 1: Invalid arguments, configuration or hash list (nothing was mounted)
/// - 2: The mount itself failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Normal unmount.
    Success = 0,
    /// Startup configuration was rejected.
    ConfigError = 1,
    /// The FUSE session could not be established.
    MountError = 2,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "HF000",
            Self::ConfigError => "HF001",
            Self::MountError => "HF002",
        }
    }

    /// Pick the exit code for an error returned by [`crate::run_app`].
    #[must_use]
    pub fn for_error(err: &anyhow::Error) -> Self {
        if err.downcast_ref::<ConfigError>().is_some() {
            Self::ConfigError
        } else {
            Self::MountError
        }
    }
}

/// Startup-fatal configuration problems. Nothing is mounted when one occurs.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The hash list file could not be read.
    #[error("Cannot read hash list {path}: {source}")]
    ReadHashList {
        /// Hash list location
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A hash list line had a hash but no path.
    #[error("Malformed hash list line {line}: {content:?}")]
    MalformedLine {
        /// 1-based line number
        line: usize,
        /// The offending line
        content: String,
    },

    /// The directory to filter does not exist or is not a directory.
    #[error("Root is not a directory: {0}")]
    RootNotDirectory(PathBuf),

    /// The mount point does not exist or is not a directory.
    #[error("Mount point is not a directory: {0}")]
    MountpointNotDirectory(PathBuf),

    /// Layered configuration could not be merged or extracted.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "HF001")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message, including its causes
    pub message: String,
}

impl StructuredError {
    /// Create a new structured error from an anyhow error and an exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{err:#}"),
        }
    }
}
