//! Cooperative cancellation.
//!
//! A [`CancellationToken`] wraps a shared `AtomicBool` and an optional
//! deadline. Every stage of the pipeline polls it: the walker stops producing,
//! the producer stops waiting on a full queue, workers stop picking up new items
//! and the full-tier hasher checks it between chunks. A timeout is simply a
//! deadline after which the token reports itself cancelled.
//!
//! # Usage
//!
//! ```rust,no_run
//! use dupetree::cancel::install_ctrlc_handler;
//! use dupetree::{DuplicateFinder, ScanConfig};
//! use std::path::Path;
//!
//! let token = install_ctrlc_handler().expect("signal handler");
//! let finder = DuplicateFinder::new(ScanConfig::default())
//!     .unwrap()
//!     .with_cancellation(token);
//! let result = finder.scan(Path::new(".")).unwrap();
//! if result.is_cancelled() {
//!     eprintln!("scan interrupted, results are partial");
//! }
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

/// Shared cancellation flag with an optional deadline.
///
/// Clones share the same flag. The deadline belongs to the clone it was set on,
/// so a scan can add its own timeout without affecting the caller's token.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancellationToken {
    /// Create a token that is not cancelled and has no deadline.
    #[must_use]
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: None,
        }
    }

    /// Wrap an existing flag.
    #[must_use]
    pub fn from_flag(flag: Arc<AtomicBool>) -> Self {
        Self {
            flag,
            deadline: None,
        }
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// `true` once [`cancel`](Self::cancel) was called on any clone or the
    /// deadline has passed.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        if self.flag.load(Ordering::SeqCst) {
            return true;
        }
        match self.deadline {
            Some(deadline) => Instant::now() >= deadline,
            None => false,
        }
    }

    /// `true` if the deadline (not an explicit cancel) is what tripped the token.
    #[must_use]
    pub fn is_timed_out(&self) -> bool {
        matches!(self.deadline, Some(deadline) if Instant::now() >= deadline)
    }

    /// Copy of this token that additionally expires at `deadline`.
    ///
    /// An earlier existing deadline is kept.
    #[must_use]
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        };
        Self {
            flag: Arc::clone(&self.flag),
            deadline: Some(deadline),
        }
    }

    /// Copy of this token that expires `timeout` from now.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        // An unrepresentable deadline never expires.
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self.clone(),
        }
    }

    /// The shared flag, for code that only understands `AtomicBool`.
    #[must_use]
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    /// Clear the flag. Deadlines are not affected.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

impl Default for CancellationToken {
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

static GLOBAL_TOKEN: OnceLock<CancellationToken> = OnceLock::new();

/// Install a Ctrl+C / SIGTERM handler that cancels a process-wide token.
///
/// The hook is installed once per process. Later calls return the same token,
/// reset to the not-cancelled state.
///
/// # Errors
///
/// Returns [`SignalError::InstallFailed`] if another handler was registered
/// outside this crate.
pub fn install_ctrlc_handler() -> Result<CancellationToken, SignalError> {
    if let Some(token) = GLOBAL_TOKEN.get() {
        token.reset();
        return Ok(token.clone());
    }

    let token = CancellationToken::new();
    let flag = token.flag();

    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
        let _ = writeln!(std::io::stderr(), "\nInterrupted. Finishing in-flight work...");
        let _ = std::io::stderr().flush();
        log::info!("Cancellation signal received");
    })?;

    match GLOBAL_TOKEN.set(token.clone()) {
        Ok(()) => Ok(token),
        // Lost a race with a concurrent installer; use theirs.
        Err(_) => Ok(GLOBAL_TOKEN.get().cloned().unwrap_or(token)),
    }
}
