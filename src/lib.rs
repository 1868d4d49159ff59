//! dupetree - concurrent duplicate file detection.
//!
//! Walks a directory tree, fingerprints file contents with BLAKE3 in two
//! tiers (a cheap head/tail partial hash, then a full hash only where partial
//! hashes collide) on a bounded worker pool, and groups files with identical
//! content. A persistent metadata cache lets repeat scans skip full reads of
//! unchanged files.
//!
//! # Example
//!
//! ```no_run
//! use dupetree::ScanConfig;
//! use std::path::Path;
//!
//! let config = ScanConfig::default().with_workers(4);
//! let result = dupetree::scan(Path::new("."), &config).unwrap();
//! for group in &result.groups {
//!     println!("{} x {} bytes", group.len(), group.size);
//!     for path in group.paths() {
//!         println!("  {}", path.display());
//!     }
//! }
//! ```

pub mod cache;
pub mod cancel;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod logging;
pub mod progress;
pub mod scanner;

use std::path::Path;

pub use cancel::CancellationToken;
pub use config::ScanConfig;
pub use duplicates::{DuplicateFinder, DuplicateGroup, FinderError, ScanResult, ScanStatus};
pub use error::{Diagnostic, DiagnosticKind};

/// Scan `root` with `config`.
///
/// # Errors
///
/// See [`DuplicateFinder::new`] and [`DuplicateFinder::scan`].
pub fn scan(root: &Path, config: &ScanConfig) -> Result<ScanResult, FinderError> {
    DuplicateFinder::new(config.clone())?.scan(root)
}

/// Scan `root`, stopping early when `token` is cancelled.
///
/// # Errors
///
/// See [`DuplicateFinder::new`] and [`DuplicateFinder::scan`].
pub fn scan_with_cancel(
    root: &Path,
    config: &ScanConfig,
    token: CancellationToken,
) -> Result<ScanResult, FinderError> {
    DuplicateFinder::new(config.clone())?
        .with_cancellation(token)
        .scan(root)
}
