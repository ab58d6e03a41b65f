//! hffs - Hash-Filtered Filesystem
//!
//! A read-only FUSE mirror of a directory tree that hides every regular file
//! whose SHA-256 (and, depending on the match policy, whose path) appears in
//! an externally supplied hash list. Hidden files are absent from listings
//! and cannot be looked up or opened; everything else is passed through with
//! its host metadata unchanged.
//!
//! # Architecture
//!
//! - [`index`]: hash list loading (`hash -> [reference paths]`)
//! - [`scanner`]: host directory access and streaming SHA-256 hashing
//! - [`matcher`]: path comparison policies (`none`, `file`, `fullPath`)
//! - [`cache`]: memoized per-path hidden/visible verdicts
//! - [`fs`]: the read-only passthrough operations and their FUSE binding

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod fs;
pub mod index;
pub mod logging;
pub mod matcher;
pub mod scanner;
pub mod signal;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::cli::Cli;
use crate::config::Config;
use crate::error::{ConfigError, ExitCode};
use crate::fs::FilterFs;
use crate::index::HashIndex;
use crate::scanner::{Hasher, LocalStore};

/// Everything needed to mount, validated and loaded.
#[derive(Debug)]
pub struct MountPlan {
    /// Effective configuration after all layers.
    pub config: Config,
    /// Canonical directory being filtered.
    pub root: PathBuf,
    /// Where the filtered view is mounted.
    pub mountpoint: PathBuf,
    /// The filesystem to serve.
    pub fs: FilterFs,
}

/// Validate arguments, merge configuration and load the hash list.
///
/// # Errors
///
/// A [`ConfigError`] (wrapped in `anyhow`) for any startup problem. Nothing
/// has been mounted when this fails.
pub fn prepare(cli: &Cli) -> Result<MountPlan> {
    let mut config = Config::load(cli.config.as_deref())?;
    config.apply_cli(cli);
    config.validate()?;

    if !cli.root.is_dir() {
        return Err(ConfigError::RootNotDirectory(cli.root.clone()).into());
    }
    if !cli.mountpoint.is_dir() {
        return Err(ConfigError::MountpointNotDirectory(cli.mountpoint.clone()).into());
    }
    let root = std::fs::canonicalize(&cli.root)
        .map_err(|_| ConfigError::RootNotDirectory(cli.root.clone()))?;
    if let Ok(mountpoint) = std::fs::canonicalize(&cli.mountpoint) {
        if mountpoint.starts_with(&root) {
            log::warn!(
                "Mount point {} lies inside the filtered root {}",
                mountpoint.display(),
                root.display()
            );
        }
    }

    let index = HashIndex::load(&cli.hash_list)?;
    let fs = FilterFs::new(
        Arc::new(LocalStore::new(&root)),
        Arc::new(index),
        config.match_policy,
        Hasher::with_chunk_size(config.chunk_size),
    );

    Ok(MountPlan {
        config,
        root,
        mountpoint: cli.mountpoint.clone(),
        fs,
    })
}

/// Run hffs: prepare, mount, and serve until interrupted or unmounted.
///
/// # Errors
///
/// Startup [`ConfigError`]s, or a mount failure.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);

    let plan = prepare(&cli)?;
    log::info!(
        "Filtering {} with policy {}",
        plan.root.display(),
        plan.config.match_policy
    );

    let shutdown = signal::install_handler().context("Failed to install signal handler")?;
    let session = fs::fuse::spawn_mount(plan.fs, &plan.mountpoint, &plan.config)
        .with_context(|| format!("Failed to mount at {}", plan.mountpoint.display()))?;

    let requested = shutdown.wait_until(|| session.guard.is_finished(), Duration::from_millis(200));
    if requested {
        log::info!("Unmounting {}", plan.mountpoint.display());
    } else {
        log::info!("{} was unmounted", plan.mountpoint.display());
    }
    drop(session);

    Ok(ExitCode::Success)
}
