//! Signal handling for clean unmounts.
//!
//! Ctrl+C (and SIGTERM/SIGHUP) set a shared flag instead of killing the
//! process. The main thread watches the flag while the filesystem is served
//! in the background, then drops the FUSE session, which unmounts it.
//!
//! # Usage
//!
//! ```rust,no_run
//! use hffs::signal::install_handler;
//! use std::time::Duration;
//!
//! let handler = install_handler().expect("Failed to install signal handler");
//! handler.wait_until(|| false, Duration::from_millis(200));
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Duration;

/// Shared "please unmount" flag.
#[derive(Debug, Clone)]
pub struct ShutdownHandler {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandler {
    /// Create a handler with no shutdown requested.
    #[must_use]
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// True once a signal arrived or [`ShutdownHandler::request_shutdown`] ran.
    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Request shutdown without a signal.
    pub fn request_shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Clear the flag so the handler can be reused.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    /// Block until shutdown is requested or `finished` returns true,
    /// checking every `poll`. Returns true if shutdown was requested.
    pub fn wait_until(&self, finished: impl Fn() -> bool, poll: Duration) -> bool {
        loop {
            if self.is_shutdown_requested() {
                return true;
            }
            if finished() {
                return false;
            }
            thread::sleep(poll);
        }
    }
}

impl Default for ShutdownHandler {
    fn default() -> Self {
        Self::new()
    }
}

/// Error type for signal handler installation.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// Failed to install the Ctrl+C handler.
    #[error("Failed to install signal handler: {0}")]
    InstallFailed(#[from] ctrlc::Error),
}

static GLOBAL_HANDLER: OnceLock<ShutdownHandler> = OnceLock::new();

/// Install the process-wide signal hook and return its handler.
///
/// Repeated calls return the already-installed handler with its flag reset.
///
/// # Errors
///
/// [`SignalError::InstallFailed`] if another component already owns the
/// Ctrl+C hook.
pub fn install_handler() -> Result<ShutdownHandler, SignalError> {
    if let Some(handler) = GLOBAL_HANDLER.get() {
        handler.reset();
        return Ok(handler.clone());
    }

    let handler = ShutdownHandler::new();
    let flag = Arc::clone(&handler.flag);
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
        let _ = writeln!(std::io::stderr(), "\nInterrupted. Unmounting...");
        log::info!("Shutdown signal received");
    })?;

    let _ = GLOBAL_HANDLER.set(handler.clone());
    Ok(handler)
}
