//! Scanner module for directory traversal and file fingerprinting.
//!
//! This module provides:
//! - Lazy, depth-first directory walking with depth, pattern, hidden-entry
//!   and symlink policies
//! - Two-tier content fingerprints with BLAKE3
//!
//! # Architecture
//!
//! - [`walker`]: Directory traversal and file discovery
//! - [`hasher`]: Partial and full fingerprints, read-count instrumentation
//! - [`links`]: Collapsing hard links and followed symlinks to one path
//!
//! # Example
//!
//! ```no_run
//! use dupetree::scanner::{Walker, WalkerConfig};
//! use std::path::Path;
//!
//! let config = WalkerConfig {
//!     max_depth: Some(3),
//!     exclude_patterns: vec!["target".to_string()],
//!     ..Default::default()
//! };
//!
//! let walker = Walker::new(Path::new("."), config);
//! for entry in walker.walk() {
//!     match entry {
//!         Ok(file) => println!("{}: {} bytes", file.path.display(), file.size),
//!         Err(e) => eprintln!("Warning: {}", e),
//!     }
//! }
//! ```

pub mod hasher;
pub mod links;
pub mod walker;

use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;

use crate::config::ScanConfig;
use crate::error::{Diagnostic, DiagnosticKind};

pub use hasher::{hash_to_hex, Fingerprint, Hash, HashCounters, HashOutcome, Hasher, Tier};
pub use links::{FileId, LinkTracker};
pub use walker::Walker;

/// One regular file discovered by the walker.
///
/// Size and modification time are captured from a single metadata call at
/// discovery; later changes to the file do not affect a descriptor already
/// handed downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDescriptor {
    /// Path of the file (absolute when the walker root is absolute)
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modification time
    pub modified: SystemTime,
    /// Depth below the scan root (files directly in the root have depth 1)
    pub depth: usize,
    /// Discovery order within the walk
    pub ordinal: u64,
    /// On-disk identity, when the platform provides one
    #[serde(skip)]
    pub file_id: Option<FileId>,
}

impl FileDescriptor {
    #[must_use]
    pub fn new(path: PathBuf, size: u64, modified: SystemTime) -> Self {
        Self {
            path,
            size,
            modified,
            depth: 0,
            ordinal: 0,
            file_id: None,
        }
    }
}

/// Configuration for directory walking.
#[derive(Debug, Clone)]
pub struct WalkerConfig {
    /// Maximum depth to visit (root = 0). `None` is unlimited.
    pub max_depth: Option<usize>,

    /// Gitignore-style patterns. A matching directory is pruned entirely.
    pub exclude_patterns: Vec<String>,

    /// Visit entries whose name starts with `.`.
    pub include_hidden: bool,

    /// Follow symbolic links. Real directories are entered at most once.
    pub follow_symlinks: bool,

    /// Files below this size are yielded but are not hash candidates.
    pub min_size: u64,

    /// Yield non-regular entries as [`ScanError::Unsupported`].
    pub report_unsupported: bool,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            max_depth: None,
            exclude_patterns: Vec::new(),
            include_hidden: false,
            follow_symlinks: false,
            min_size: 1,
            report_unsupported: false,
        }
    }
}

impl From<&ScanConfig> for WalkerConfig {
    fn from(config: &ScanConfig) -> Self {
        Self {
            max_depth: config.max_depth,
            exclude_patterns: config.exclude_patterns.clone(),
            include_hidden: config.include_hidden,
            follow_symlinks: config.follow_symlinks,
            min_size: config.min_file_size,
            report_unsupported: config.report_unsupported,
        }
    }
}

/// Errors that can occur for a single entry during traversal.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// Permission was denied when accessing a file or directory.
    #[error("Permission denied: {0}")]
    AccessDenied(PathBuf),

    /// The entry disappeared while the walk was in progress.
    #[error("Entry vanished during scan: {0}")]
    Vanished(PathBuf),

    /// The entry is not a regular file (device, socket, fifo, broken symlink).
    #[error("Unsupported entry: {0}")]
    Unsupported(PathBuf),

    /// Any other I/O error.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },
}

impl ScanError {
    /// Classify an I/O error for `path`.
    #[must_use]
    pub fn from_io(path: &Path, error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::PermissionDenied => Self::AccessDenied(path.to_path_buf()),
            io::ErrorKind::NotFound => Self::Vanished(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: error,
            },
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::AccessDenied(path) | Self::Vanished(path) | Self::Unsupported(path) => path,
            Self::Io { path, .. } => path,
        }
    }

    #[must_use]
    pub fn to_diagnostic(&self) -> Diagnostic {
        let kind = match self {
            Self::AccessDenied(_) => DiagnosticKind::AccessDenied,
            Self::Vanished(_) => DiagnosticKind::VanishedEntry,
            Self::Unsupported(_) => DiagnosticKind::UnsupportedEntry,
            Self::Io { .. } => DiagnosticKind::Io,
        };
        Diagnostic::new(self.path(), kind, self.to_string())
    }
}

/// Errors that can occur while fingerprinting a file.
#[derive(thiserror::Error, Debug)]
pub enum HashError {
    /// Permission was denied when reading the file.
    #[error("Permission denied: {0}")]
    AccessDenied(PathBuf),

    /// The file was removed after it was discovered.
    #[error("File vanished before it could be read: {0}")]
    Vanished(PathBuf),

    /// Hashing was abandoned because the scan was cancelled.
    #[error("Hashing interrupted: {0}")]
    Interrupted(PathBuf),

    /// An I/O error occurred while reading the file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },
}

impl HashError {
    /// Classify an I/O error for `path`.
    #[must_use]
    pub fn from_io(path: &Path, error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::PermissionDenied => Self::AccessDenied(path.to_path_buf()),
            io::ErrorKind::NotFound => Self::Vanished(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: error,
            },
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::AccessDenied(path) | Self::Vanished(path) | Self::Interrupted(path) => path,
            Self::Io { path, .. } => path,
        }
    }

    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted(_))
    }

    /// Diagnostic for this failure. Interruptions are not diagnostics.
    #[must_use]
    pub fn to_diagnostic(&self) -> Option<Diagnostic> {
        let kind = match self {
            Self::AccessDenied(_) => DiagnosticKind::AccessDenied,
            Self::Vanished(_) => DiagnosticKind::VanishedEntry,
            Self::Interrupted(_) => return None,
            Self::Io { .. } => DiagnosticKind::Io,
        };
        Some(Diagnostic::new(self.path(), kind, self.to_string()))
    }
}
