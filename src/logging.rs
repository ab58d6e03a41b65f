//! Logging setup for hffs.
//!
//! Uses the `log` facade with an `env_logger` backend on stderr. The level
//! comes from, in priority order:
//!
//! 1. `RUST_LOG` (if set)
//! 2. `--quiet` (errors only)
//! 3. `-v` (debug) / `-vv` (trace)
//! 4. info
//!
//! At debug level every hidden file is reported together with the hash list
//! entry it matched; trace adds one line per passthrough call.

use env_logger::Builder;
use log::LevelFilter;
use std::env;
use std::io::Write;

/// Initialize logging from CLI verbosity flags.
///
/// Safe to call more than once; only the first call installs a logger.
///
/// # Arguments
///
/// * `verbose` - Verbosity count from CLI (0=info, 1=debug, 2+=trace)
/// * `quiet` - Only show errors (ignored when `RUST_LOG` is set)
///
/// # Example
///
/// ```rust,no_run
/// use hffs::logging::init_logging;
///
/// init_logging(1, false);
/// log::debug!("Hidden verdicts are logged at this level");
/// ```
pub fn init_logging(verbose: u8, quiet: bool) {
    let mut builder = Builder::new();

    let from_env = env::var("RUST_LOG").is_ok();
    if from_env {
        builder.parse_default_env();
    } else {
        builder.filter_level(determine_level(verbose, quiet));
    }

    builder.format(move |buf, record| {
        let level_style = buf.default_level_style(record.level());
        if verbose >= 1 {
            writeln!(
                buf,
                "{} {level_style}{:<5}{level_style:#} [{}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.target(),
                record.args()
            )
        } else {
            writeln!(
                buf,
                "{} {level_style}{:<5}{level_style:#} {}",
                buf.timestamp_seconds(),
                record.level(),
                record.args()
            )
        }
    });

    if builder.try_init().is_ok() {
        log::debug!(
            "Logging initialized ({})",
            if from_env { "RUST_LOG" } else { "cli flags" }
        );
    }
}

/// Map CLI flags to a level filter. `quiet` wins over `verbose`.
fn determine_level(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::Error;
    }
    match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}
