//! Logging setup for applications embedding the scan engine.
//!
//! The engine itself only talks to the `log` facade. This module installs an
//! `env_logger` backend for callers that do not bring their own. The level is
//! chosen in priority order:
//!
//! 1. `RUST_LOG` environment variable (if set)
//! 2. `quiet` (error only) or `verbose` count (debug/trace)
//! 3. Default: info for this crate, warn for everything else
//!
//! Debug builds prefix records with a timestamp; release builds print level
//! and message only.
//!
//! ```rust,no_run
//! use dupetree::logging::init_logging;
//!
//! init_logging(1, false);
//! log::debug!("visible");
//! ```

use std::env;
use std::io::Write;

use env_logger::Builder;
use log::{LevelFilter, SetLoggerError};

/// Install the logger, ignoring the error if a logger is already set.
///
/// Convenient for tests and binaries that may call it more than once.
pub fn init_logging(verbose: u8, quiet: bool) {
    if let Err(e) = try_init_logging(verbose, quiet) {
        log::debug!("Logger already initialized: {}", e);
    }
}

/// Install the logger.
///
/// # Errors
///
/// Returns [`SetLoggerError`] if another logger was already installed.
pub fn try_init_logging(verbose: u8, quiet: bool) -> Result<(), SetLoggerError> {
    let from_env = env::var("RUST_LOG").ok();

    let level = determine_level(verbose, quiet);

    let mut builder = Builder::new();
    if let Some(filters) = &from_env {
        builder.parse_filters(filters);
    } else {
        // Dependencies stay at warn unless RUST_LOG asks otherwise.
        builder
            .filter_level(LevelFilter::Warn.min(level))
            .filter_module(env!("CARGO_CRATE_NAME"), level);
    }
    configure_format(&mut builder, verbose);
    builder.try_init()?;

    log::debug!(
        "Logging initialized ({})",
        from_env.map_or_else(|| format!("level {level}"), |f| format!("RUST_LOG={f}"))
    );
    Ok(())
}

/// `quiet` wins over `verbose`.
fn determine_level(verbose: u8, quiet: bool) -> LevelFilter {
    match (quiet, verbose) {
        (true, _) => LevelFilter::Error,
        (false, 0) => LevelFilter::Info,
        (false, 1) => LevelFilter::Debug,
        (false, _) => LevelFilter::Trace,
    }
}

fn configure_format(builder: &mut Builder, verbose: u8) {
    let debug_build = cfg!(debug_assertions);
    let show_module = debug_build && verbose >= 1;

    builder.format(move |buf, record| {
        let style = buf.default_level_style(record.level());
        if debug_build {
            let timestamp = buf.timestamp_seconds();
            write!(buf, "{timestamp} ")?;
        }
        write!(buf, "{style}{:<5}{style:#} ", record.level())?;
        if show_module {
            write!(buf, "[{}] ", record.module_path().unwrap_or("unknown"))?;
        }
        writeln!(buf, "{}", record.args())
    });
}

/// Name of the currently active maximum log level.
#[must_use]
pub fn current_level_name() -> &'static str {
    match log::max_level() {
        LevelFilter::Off => "off",
        LevelFilter::Error => "error",
        LevelFilter::Warn => "warn",
        LevelFilter::Info => "info",
        LevelFilter::Debug => "debug",
        LevelFilter::Trace => "trace",
    }
}
