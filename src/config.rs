//! Scan configuration.
//!
//! [`ScanConfig`] is the single, explicit set of knobs a scan recognizes. It can
//! be built in code or parsed from TOML. Unknown keys are rejected rather than
//! silently ignored, so a typo in a configuration file surfaces as an error.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use ignore::gitignore::GitignoreBuilder;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Upper bound for the default worker count.
///
/// Hashing is I/O bound; past this point extra threads mostly add seek contention.
pub const MAX_DEFAULT_WORKERS: usize = 16;

/// Work queue slots per worker when no explicit capacity is configured.
pub const QUEUE_SLOTS_PER_WORKER: usize = 4;

/// File name of the persisted metadata cache inside the cache directory.
pub const CACHE_FILE_NAME: &str = "hashes.db";

/// Configuration for a single scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScanConfig {
    /// Maximum depth below the root to visit (root = 0). `None` is unlimited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<usize>,

    /// Gitignore-style glob patterns; matching entries are skipped and
    /// matching directories are pruned.
    pub exclude_patterns: Vec<String>,

    /// Visit entries whose name starts with `.`.
    pub include_hidden: bool,

    /// Follow symbolic links (with a cycle guard).
    pub follow_symlinks: bool,

    /// Files smaller than this are never hashed.
    pub min_file_size: u64,

    /// Number of hashing workers. Must be greater than zero.
    pub num_workers: usize,

    /// Capacity of the bounded work queue. `None` derives it from `num_workers`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_capacity: Option<usize>,

    /// Consult and update the persisted metadata cache.
    pub use_cache: bool,

    /// Cache database path. `None` uses the platform cache directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_location: Option<PathBuf>,

    /// Wall-clock timeout for the whole scan in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Report non-regular entries as diagnostics instead of skipping them silently.
    pub report_unsupported: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_depth: None,
            exclude_patterns: Vec::new(),
            include_hidden: false,
            follow_symlinks: false,
            min_file_size: 1,
            num_workers: default_workers(),
            queue_capacity: None,
            use_cache: false,
            cache_location: None,
            timeout_ms: None,
            report_unsupported: false,
        }
    }
}

/// Default worker count derived from the available hardware concurrency.
#[must_use]
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(MAX_DEFAULT_WORKERS)
}

impl ScanConfig {
    /// Parse a configuration from a TOML document.
    ///
    /// Missing keys take their default values; unknown keys are an error.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed documents, unknown keys or
    /// out-of-range values (e.g. a negative worker count), and any
    /// [`validate`](Self::validate) error.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read, otherwise the
    /// same errors as [`from_toml_str`](Self::from_toml_str).
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("Loaded scan configuration from {}", path.display());
        Self::from_toml_str(&content)
    }

    /// Check the configuration for values that would make a scan meaningless.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::ZeroWorkers`] when `num_workers == 0`
    /// - [`ConfigError::ZeroQueueCapacity`] when `queue_capacity == Some(0)`
    /// - [`ConfigError::InvalidPattern`] when an exclude pattern does not compile
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        if self.queue_capacity == Some(0) {
            return Err(ConfigError::ZeroQueueCapacity);
        }

        let mut builder = GitignoreBuilder::new("");
        for pattern in &self.exclude_patterns {
            if let Err(e) = builder.add_line(None, pattern) {
                return Err(ConfigError::InvalidPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Capacity of the work queue actually used by the scheduler.
    #[must_use]
    pub fn effective_queue_capacity(&self) -> usize {
        self.queue_capacity
            .unwrap_or_else(|| self.num_workers.max(1) * QUEUE_SLOTS_PER_WORKER)
    }

    /// Scan timeout, if any.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Resolve the cache database path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoCacheLocation`] when no explicit location is set
    /// and the platform has no cache directory.
    pub fn resolved_cache_location(&self) -> Result<PathBuf, ConfigError> {
        if let Some(path) = &self.cache_location {
            return Ok(path.clone());
        }
        let dirs = ProjectDirs::from("", "", "dupetree").ok_or(ConfigError::NoCacheLocation)?;
        Ok(dirs.cache_dir().join(CACHE_FILE_NAME))
    }

    // Builder-style helpers, mostly for embedding code and tests.

    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.num_workers = workers;
        self
    }

    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    #[must_use]
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    #[must_use]
    pub fn with_exclude_patterns(mut self, patterns: Vec<String>) -> Self {
        self.exclude_patterns = patterns;
        self
    }

    #[must_use]
    pub fn with_min_file_size(mut self, bytes: u64) -> Self {
        self.min_file_size = bytes;
        self
    }

    #[must_use]
    pub fn with_cache_location(mut self, path: impl Into<PathBuf>) -> Self {
        self.use_cache = true;
        self.cache_location = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }
}
