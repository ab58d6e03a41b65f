//! Command-line interface definitions for hffs.
//!
//! # Example
//!
//! ```bash
//! # Hide every file under /data whose SHA-256 and file name match hashes.txt
//! hffs /data hashes.txt /mnt/filtered
//!
//! # Hide on hash alone, with debug logging
//! hffs -v --match-policy none /data hashes.txt /mnt/filtered
//!
//! # Require the full path recorded in the hash list to match
//! hffs --match-policy fullPath /data hashes.txt /mnt/filtered
//! ```

use clap::Parser;
use std::path::PathBuf;

use crate::matcher::MatchPolicy;

/// Read-only mirror of a directory that hides files listed in a hash list.
///
/// Files whose SHA-256 appears in the hash list (and whose path satisfies the
/// match policy) vanish from the mounted view. Everything else is passed
/// through unchanged. The mount rejects all modifications.
#[derive(Debug, Parser)]
#[command(name = "hffs")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory to expose through the filtered view
    #[arg(value_name = "ROOT")]
    pub root: PathBuf,

    /// Hash list: one `<sha256-hex> <path>` record per line
    #[arg(value_name = "HASH_LIST")]
    pub hash_list: PathBuf,

    /// Empty directory to mount the filtered view on
    #[arg(value_name = "MOUNTPOINT")]
    pub mountpoint: PathBuf,

    /// How a file's path must relate to the hash list path [default: file]
    ///
    /// none: hash alone decides; file: file names must match;
    /// fullPath: mount-relative paths must match exactly.
    #[arg(short, long, value_enum, value_name = "POLICY")]
    pub match_policy: Option<MatchPolicy>,

    /// Configuration file (TOML)
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Allow other users to access the mount
    #[arg(long)]
    pub allow_other: bool,

    /// Unmount automatically when the process exits
    #[arg(long)]
    pub auto_unmount: bool,

    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Report startup errors as JSON on stderr
    #[arg(long)]
    pub json_errors: bool,
}
