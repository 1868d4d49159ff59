//! Error taxonomy shared across the scan pipeline.
//!
//! Fatal problems (bad configuration, a root that does not exist) are returned
//! as [`ConfigError`] before any traversal starts. Everything that goes wrong
//! for a single entry during a scan is downgraded to a [`Diagnostic`] and
//! collected into the scan result instead of interrupting control flow.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

/// Classification of a non-fatal problem encountered during a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Entry could not be read because of permissions.
    AccessDenied,
    /// Entry disappeared between discovery and read.
    VanishedEntry,
    /// Non-regular entry (device, socket, fifo, broken symlink).
    ///
    /// Only reported when explicitly requested.
    UnsupportedEntry,
    /// Any other I/O failure while reading an entry.
    Io,
    /// The persisted metadata cache was unreadable and was discarded.
    CacheCorruption,
}

impl DiagnosticKind {
    /// Short machine-friendly name of the kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AccessDenied => "access_denied",
            Self::VanishedEntry => "vanished_entry",
            Self::UnsupportedEntry => "unsupported_entry",
            Self::Io => "io",
            Self::CacheCorruption => "cache_corruption",
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A non-fatal event recorded during a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Path the event refers to.
    pub path: PathBuf,
    /// What kind of problem occurred.
    pub kind: DiagnosticKind,
    /// Human-readable reason.
    pub reason: String,
}

impl Diagnostic {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, kind: DiagnosticKind, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.path.display(), self.kind, self.reason)
    }
}

/// Invalid scan configuration. Always fatal: the scan does not start.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// `num_workers` was zero.
    #[error("Worker count must be greater than zero")]
    ZeroWorkers,

    /// `queue_capacity` was explicitly set to zero.
    #[error("Queue capacity must be greater than zero")]
    ZeroQueueCapacity,

    /// The scan root does not exist.
    #[error("Scan root not found: {0}")]
    RootNotFound(PathBuf),

    /// The scan root exists but is not a directory.
    #[error("Scan root is not a directory: {0}")]
    RootNotADirectory(PathBuf),

    /// An exclude pattern could not be compiled.
    #[error("Invalid exclude pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Parser message.
        reason: String,
    },

    /// The configuration document could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration file could not be read.
    #[error("Failed to read configuration {path}: {source}")]
    Read {
        /// Path of the configuration file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Caching was requested but no cache location could be determined.
    #[error("Could not determine a cache location for this platform")]
    NoCacheLocation,
}
