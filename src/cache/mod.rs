//! Metadata cache for incremental re-scans.
//!
//! A cache remembers the full-tier fingerprint of a path together with the
//! size and modification time the file had when it was hashed. On the next
//! scan a file whose size and mtime are unchanged is not read again.
//!
//! # Architecture
//!
//! * [`MetadataCache`]: the two-operation contract the scan depends on
//! * [`database`]: SQLite persistence ([`HashCache`])
//! * [`memory`]: process-local store ([`MemoryCache`]), also the fallback
//!   when the persisted cache cannot be used
//! * [`entry`]: the stored record
//!
//! # Cache Invalidation
//!
//! A lookup hits only when both size and modification time (to the
//! nanosecond) match exactly. Anything else is a miss and the file is
//! re-hashed; the fresh value then overwrites the old entry.
//!
//! # Single writer
//!
//! Workers only call [`MetadataCache::lookup`]. Every
//! [`MetadataCache::store`] happens on the scan's result-collection stage.

pub mod database;
pub mod entry;
pub mod memory;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use crate::error::{Diagnostic, DiagnosticKind};
use crate::scanner::Fingerprint;

pub use database::HashCache;
pub use entry::CacheEntry;
pub use memory::MemoryCache;

/// Errors raised by cache backends.
#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    /// SQLite reported an error.
    #[error("Cache database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The cache file or its directory could not be accessed.
    #[error("Cache I/O error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The cache file exists but is not a usable database.
    #[error("Cache file {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

/// Result alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// `(path, size, mtime) -> fingerprint` memo.
pub trait MetadataCache: Send + Sync {
    /// Fingerprint stored for `path`, if its size and mtime match exactly.
    fn lookup(&self, path: &Path, size: u64, modified: SystemTime)
        -> CacheResult<Option<Fingerprint>>;

    /// Insert or overwrite the entry for `entry.path`.
    fn store(&self, entry: &CacheEntry) -> CacheResult<()>;
}

/// A cache ready for a scan, plus the warning raised while opening it.
pub struct OpenedCache {
    pub cache: Arc<dyn MetadataCache>,
    pub diagnostic: Option<Diagnostic>,
}

/// Open the persisted cache at `path`, recovering from corruption.
///
/// A corrupt file is deleted and recreated. If the cache still cannot be
/// opened, an empty in-memory cache is used for this scan. Either way the
/// problem is reported as a [`DiagnosticKind::CacheCorruption`] warning.
#[must_use]
pub fn open_or_recover(path: &Path) -> OpenedCache {
    let err = match HashCache::open(path) {
        Ok(cache) => {
            return OpenedCache {
                cache: Arc::new(cache),
                diagnostic: None,
            }
        }
        Err(e) => e,
    };

    log::warn!("Discarding unusable hash cache: {}", err);
    let diagnostic = Some(Diagnostic::new(
        path,
        DiagnosticKind::CacheCorruption,
        err.to_string(),
    ));

    if matches!(err, CacheError::Corrupt { .. }) {
        HashCache::remove_files(path);
        match HashCache::open(path) {
            Ok(cache) => {
                log::debug!("Recreated hash cache at {}", path.display());
                return OpenedCache {
                    cache: Arc::new(cache),
                    diagnostic,
                };
            }
            Err(e) => log::warn!("Failed to recreate hash cache: {}", e),
        }
    }

    log::debug!("Falling back to an in-memory hash cache");
    OpenedCache {
        cache: Arc::new(MemoryCache::new()),
        diagnostic,
    }
}
