//! Cache entry definitions.

use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::scanner::{FileDescriptor, Fingerprint};

/// Memo of a full-tier fingerprint for one path.
///
/// Valid only while the file's size and modification time still match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
    pub fingerprint: Fingerprint,
}

impl CacheEntry {
    /// Entry for a freshly hashed file, keyed on its discovery-time metadata.
    #[must_use]
    pub fn new(file: &FileDescriptor, fingerprint: Fingerprint) -> Self {
        Self {
            path: file.path.clone(),
            size: file.size,
            modified: file.modified,
            fingerprint,
        }
    }

    /// `true` if the entry still describes a file with this size and mtime.
    #[must_use]
    pub fn matches(&self, size: u64, modified: SystemTime) -> bool {
        self.size == size && self.modified == modified
    }

    /// Modification time as (seconds, nanoseconds) relative to the Unix epoch.
    #[must_use]
    pub fn mtime_parts(&self) -> (i64, u32) {
        mtime_to_parts(self.modified)
    }
}

/// Split a timestamp into floor seconds and a non-negative nanosecond part.
///
/// Pre-epoch times get negative seconds, so the mapping stays one-to-one.
#[must_use]
pub fn mtime_to_parts(time: SystemTime) -> (i64, u32) {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => (i64::try_from(d.as_secs()).unwrap_or(i64::MAX), d.subsec_nanos()),
        Err(e) => {
            let d = e.duration();
            let secs = i64::try_from(d.as_secs()).unwrap_or(i64::MAX);
            match d.subsec_nanos() {
                0 => (-secs, 0),
                nanos => (-secs - 1, 1_000_000_000 - nanos),
            }
        }
    }
}

/// Inverse of [`mtime_to_parts`].
#[must_use]
pub fn parts_to_mtime(secs: i64, nanos: u32) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::new(secs.unsigned_abs(), nanos)
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs()) + Duration::from_nanos(u64::from(nanos))
    }
}
