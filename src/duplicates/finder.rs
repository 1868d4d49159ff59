//! Scan orchestration: walk, partial pass, full pass, grouping.
//!
//! # Pipeline
//!
//! 1. **Partial pass** - the walker feeds candidates straight into the
//!    scheduler; workers compute partial fingerprints while the walk is
//!    still running. Further paths to a file already fed (hard links,
//!    followed symlinks) are dropped first. Files that fit in one block are
//!    settled here and go through the metadata cache.
//! 2. **Partition** - results are bucketed by partial fingerprint. Singletons
//!    cannot have a duplicate and are dropped without further I/O. Buckets of
//!    small files already carry full fingerprints and are final. The rest are
//!    promoted.
//! 3. **Full pass** - only promoted files are read completely, consulting the
//!    metadata cache first. Fresh results are stored on the collecting thread.
//! 4. **Grouping** - full fingerprints shared by two or more files become
//!    duplicate groups.
//!
//! Cancellation (explicit or via timeout) stops the walk, drains queued work
//! without hashing it and skips the full pass. A result is marked
//! [`ScanStatus::Cancelled`] only when some of that work was actually cut
//! short; it then contains just the groups whose members' full fingerprints
//! were already known. A cancellation that arrives after the last file was
//! settled leaves the result [`ScanStatus::Completed`].

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytesize::ByteSize;
use serde::Serialize;

use super::groups::{bucket_by_fingerprint, group_by_fingerprint, sort_groups, DuplicateGroup};
use super::scheduler::Scheduler;
use crate::cache::{self, CacheEntry, MetadataCache};
use crate::cancel::CancellationToken;
use crate::config::ScanConfig;
use crate::error::{ConfigError, Diagnostic};
use crate::progress::{ProgressCallback, PHASE_FULL, PHASE_PARTIAL};
use crate::scanner::{
    FileDescriptor, Fingerprint, HashError, HashOutcome, Hasher, LinkTracker, Walker, WalkerConfig,
};

/// Key used in [`ScanResult::file_types`] for files without an extension.
pub const NO_EXTENSION: &str = "(no extension)";

/// Errors that prevent a scan from producing a result.
#[derive(thiserror::Error, Debug)]
pub enum FinderError {
    /// The configuration or the scan root is unusable.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(#[from] ConfigError),

    /// The worker pool could not be started.
    #[error("Failed to start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// A scan thread panicked.
    #[error("A scan thread panicked")]
    WorkerPanicked,
}

/// Whether the scan ran to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Completed,
    Cancelled,
}

/// Counters describing how a scan spent its work.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanStats {
    /// Files dispatched to the partial pass
    pub candidates: u64,
    /// Files visited but below the minimum size
    pub below_min_size: u64,
    /// Extra paths to a file that was already a candidate
    pub links_collapsed: u64,
    /// Successful partial-tier results
    pub partial_hashed: u64,
    /// Files whose partial fingerprint was shared and needed a full pass
    pub promoted: u64,
    /// Successful full-tier results (fresh or cached)
    pub full_hashed: u64,
    /// Files that failed in either pass
    pub failed: u64,
    /// Dispatched files dropped because cancellation was observed first
    pub abandoned: u64,
    /// Full-tier lookups served by the cache, in either pass
    pub cache_hits: u64,
    /// Full-tier lookups that required reading the file
    pub cache_misses: u64,
    /// Fresh results the cache refused to store
    pub cache_write_failures: u64,
    /// Files opened for a partial read
    pub partial_reads: u64,
    /// Files opened for a full read
    pub full_reads: u64,
    /// Bytes read across both passes
    pub bytes_read: u64,
    /// Highest number of items queued or being hashed at once
    pub peak_in_flight: usize,
    /// Worker count used
    pub workers: usize,
    /// Work queue capacity used
    pub queue_capacity: usize,
    /// Wall-clock duration of the scan
    pub duration: Duration,
}

/// Everything a scan found.
#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    /// Canonical scan root
    pub root: PathBuf,
    /// Completed or cancelled
    pub status: ScanStatus,
    /// Regular files that passed the walk filters
    pub files_visited: u64,
    /// Total size of visited files
    pub bytes_visited: u64,
    /// Duplicate groups, largest wasted space first
    pub groups: Vec<DuplicateGroup>,
    /// Redundant copies across all groups
    pub duplicate_files: usize,
    /// Bytes reclaimable by keeping one copy per group
    pub wasted_space: u64,
    /// Non-fatal problems, sorted by path
    pub diagnostics: Vec<Diagnostic>,
    /// Visited file count per lowercase extension
    pub file_types: BTreeMap<String, u64>,
    /// Work counters
    pub stats: ScanStats,
}

impl ScanResult {
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == ScanStatus::Completed
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.status == ScanStatus::Cancelled
    }

    /// Order members by discovery and groups by wasted space, then discovery.
    ///
    /// Makes the result identical across runs over an unchanged tree.
    pub fn sort_by_discovery(&mut self) {
        for group in &mut self.groups {
            group.sort_by_discovery();
        }
        sort_groups(&mut self.groups);
    }

    /// Percentage of visited bytes that are redundant.
    #[must_use]
    pub fn wasted_percentage(&self) -> f64 {
        if self.bytes_visited == 0 {
            0.0
        } else {
            (self.wasted_space as f64 / self.bytes_visited as f64) * 100.0
        }
    }

    /// Wasted space as a human-readable string.
    #[must_use]
    pub fn wasted_display(&self) -> String {
        ByteSize(self.wasted_space).to_string()
    }

    /// Total visited size as a human-readable string.
    #[must_use]
    pub fn bytes_visited_display(&self) -> String {
        ByteSize(self.bytes_visited).to_string()
    }
}

/// What the producer saw while walking.
#[derive(Debug, Default)]
struct WalkSummary {
    files_visited: u64,
    bytes_visited: u64,
    below_min_size: u64,
    links_collapsed: u64,
    file_types: BTreeMap<String, u64>,
    diagnostics: Vec<Diagnostic>,
    /// The walk or the feed stopped on cancellation
    interrupted: bool,
}

impl WalkSummary {
    fn record(&mut self, file: &FileDescriptor) {
        self.files_visited += 1;
        self.bytes_visited += file.size;
        let ext = file
            .path
            .extension()
            .and_then(|e| e.to_str())
            .map_or_else(|| NO_EXTENSION.to_string(), str::to_lowercase);
        *self.file_types.entry(ext).or_insert(0) += 1;
    }
}

/// Runs scans with one configuration.
///
/// # Example
///
/// ```no_run
/// use dupetree::{DuplicateFinder, ScanConfig};
/// use std::path::Path;
///
/// let finder = DuplicateFinder::new(ScanConfig::default().with_workers(4)).unwrap();
/// let result = finder.scan(Path::new("/some/path")).unwrap();
///
/// println!("Found {} duplicate groups", result.groups.len());
/// println!("Reclaimable space: {}", result.wasted_display());
/// ```
pub struct DuplicateFinder {
    config: ScanConfig,
    cache: Option<Arc<dyn MetadataCache>>,
    cancel: CancellationToken,
    progress: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for DuplicateFinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuplicateFinder")
            .field("config", &self.config)
            .field("cache", &self.cache.as_ref().map(|_| "<dyn MetadataCache>"))
            .field("cancel", &self.cancel)
            .field("progress", &self.progress.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

impl DuplicateFinder {
    /// Validate `config` and build a finder.
    ///
    /// # Errors
    ///
    /// Returns [`FinderError::InvalidConfiguration`] for any
    /// [`ScanConfig::validate`] failure.
    pub fn new(config: ScanConfig) -> Result<Self, FinderError> {
        config.validate()?;
        Ok(Self {
            config,
            cache: None,
            cancel: CancellationToken::new(),
            progress: None,
        })
    }

    /// Use this cache instance instead of opening one from the configuration.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn MetadataCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = Some(callback);
        self
    }

    #[must_use]
    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Handle that cancels scans run by this finder.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn resolve_root(root: &Path) -> Result<PathBuf, ConfigError> {
        let metadata =
            fs::metadata(root).map_err(|_| ConfigError::RootNotFound(root.to_path_buf()))?;
        if !metadata.is_dir() {
            return Err(ConfigError::RootNotADirectory(root.to_path_buf()));
        }
        root.canonicalize()
            .map_err(|_| ConfigError::RootNotFound(root.to_path_buf()))
    }

    fn open_cache(&self, diagnostics: &mut Vec<Diagnostic>) -> Result<Option<Arc<dyn MetadataCache>>, ConfigError> {
        if let Some(cache) = &self.cache {
            return Ok(Some(Arc::clone(cache)));
        }
        if !self.config.use_cache {
            return Ok(None);
        }
        let location = self.config.resolved_cache_location()?;
        let opened = cache::open_or_recover(&location);
        diagnostics.extend(opened.diagnostic);
        Ok(Some(opened.cache))
    }

    /// Scan `root` for duplicate files.
    ///
    /// # Errors
    ///
    /// Returns [`FinderError::InvalidConfiguration`] if the root does not
    /// exist or is not a directory, before anything is read. Per-file
    /// problems never fail the scan; they end up in
    /// [`ScanResult::diagnostics`].
    pub fn scan(&self, root: &Path) -> Result<ScanResult, FinderError> {
        let started = Instant::now();
        let root = Self::resolve_root(root)?;
        let mut diagnostics = Vec::new();
        let cache = self.open_cache(&mut diagnostics)?;

        let token = match self.config.timeout() {
            Some(timeout) => self.cancel.with_timeout(timeout),
            None => self.cancel.clone(),
        };

        let scheduler = Scheduler::new(
            self.config.num_workers,
            self.config.effective_queue_capacity(),
            token.clone(),
        )?;
        let hasher = Hasher::new().with_cancellation(token.clone());
        let walker = Walker::new(&root, WalkerConfig::from(&self.config))
            .with_cancellation(token.clone());
        let progress = self.progress.as_deref();
        let cache_ref = cache.as_deref();

        log::info!(
            "Starting duplicate scan of {} ({} workers, queue capacity {})",
            root.display(),
            scheduler.workers(),
            scheduler.queue_capacity()
        );

        let mut stats = ScanStats {
            workers: scheduler.workers(),
            queue_capacity: scheduler.queue_capacity(),
            ..ScanStats::default()
        };

        // Partial pass, fed directly by the walk.
        if let Some(cb) = progress {
            cb.on_phase_start(PHASE_PARTIAL, 0);
        }
        let mut partial_results: Vec<(FileDescriptor, Fingerprint)> = Vec::new();
        let mut done = 0usize;
        let outcome = scheduler.run(
            |feeder| {
                let mut walk = WalkSummary::default();
                let mut links = LinkTracker::new();
                for item in walker.walk() {
                    match item {
                        Ok(file) => {
                            walk.record(&file);
                            if !walker.is_candidate(&file) {
                                walk.below_min_size += 1;
                                continue;
                            }
                            if !links.first_sighting(&file) {
                                log::debug!(
                                    "Already a candidate via another path: {}",
                                    file.path.display()
                                );
                                walk.links_collapsed += 1;
                                continue;
                            }
                            if !feeder.feed(file) {
                                walk.interrupted = true;
                                break;
                            }
                        }
                        Err(e) => walk.diagnostics.push(e.to_diagnostic()),
                    }
                }
                walk.interrupted |= walker.was_interrupted();
                walk
            },
            |file| hasher.partial_cached(file, cache_ref),
            |file, outcome| {
                done += 1;
                if let Some(cb) = progress {
                    cb.on_progress(done, &file.path.to_string_lossy());
                }
                match outcome {
                    Some(Ok(hashed)) => {
                        stats.partial_hashed += 1;
                        // Only files settled in one read were looked up.
                        if hashed.fingerprint.is_full() && file.size > 0 {
                            if let Some(cache) = cache_ref {
                                record_cache_use(cache, &file, hashed, &mut stats);
                            }
                        }
                        if let Some(cb) = progress {
                            cb.on_item_completed(file.size);
                        }
                        partial_results.push((file, hashed.fingerprint));
                    }
                    Some(Err(e)) => record_failure(&e, &mut stats, &mut diagnostics),
                    None => stats.abandoned += 1,
                }
            },
        )?;
        if let Some(cb) = progress {
            cb.on_phase_end(PHASE_PARTIAL);
        }

        let walk = outcome.produced;
        stats.candidates = outcome.dispatched;
        stats.below_min_size = walk.below_min_size;
        stats.links_collapsed = walk.links_collapsed;
        stats.peak_in_flight = outcome.peak_in_flight;
        diagnostics.extend(walk.diagnostics);

        log::info!(
            "Partial pass complete: {} files visited ({}), {} candidates, {} hashed",
            walk.files_visited,
            ByteSize(walk.bytes_visited),
            stats.candidates,
            stats.partial_hashed
        );

        // Partition by partial fingerprint.
        let mut confirmed: Vec<(FileDescriptor, Fingerprint)> = Vec::new();
        let mut promoted: Vec<FileDescriptor> = Vec::new();
        for (fingerprint, files) in bucket_by_fingerprint(partial_results) {
            if files.len() < 2 {
                continue;
            }
            if fingerprint.is_full() {
                confirmed.extend(files.into_iter().map(|f| (f, fingerprint)));
            } else {
                log::debug!(
                    "Promoting {} files sharing partial fingerprint {}",
                    files.len(),
                    &fingerprint.hash_hex()[..16]
                );
                promoted.extend(files);
            }
        }
        stats.promoted = promoted.len() as u64;

        // Full pass over promoted files only.
        let mut full_pass_skipped = false;
        if promoted.is_empty() {
            log::debug!("No partial collisions, nothing to hash fully");
        } else if token.is_cancelled() {
            log::info!("Scan cancelled, skipping full pass over {} files", promoted.len());
            full_pass_skipped = true;
        } else {
            log::info!("Full pass: hashing {} promoted files", promoted.len());
            if let Some(cb) = progress {
                cb.on_phase_start(PHASE_FULL, promoted.len());
            }
            let mut done = 0usize;
            let outcome = scheduler.run(
                move |feeder| {
                    for file in promoted {
                        if !feeder.feed(file) {
                            break;
                        }
                    }
                },
                |file| hasher.full_cached(file, cache_ref),
                |file, outcome| {
                    done += 1;
                    if let Some(cb) = progress {
                        cb.on_progress(done, &file.path.to_string_lossy());
                    }
                    match outcome {
                        Some(Ok(full)) => {
                            stats.full_hashed += 1;
                            if let Some(cache) = cache_ref {
                                record_cache_use(cache, &file, full, &mut stats);
                            }
                            if let Some(cb) = progress {
                                cb.on_item_completed(file.size);
                            }
                            confirmed.push((file, full.fingerprint));
                        }
                        Some(Err(e)) => record_failure(&e, &mut stats, &mut diagnostics),
                        None => stats.abandoned += 1,
                    }
                },
            )?;
            if let Some(cb) = progress {
                cb.on_phase_end(PHASE_FULL);
            }
            stats.peak_in_flight = stats.peak_in_flight.max(outcome.peak_in_flight);
            log::info!(
                "Full pass complete: {} hashed ({} from cache)",
                stats.full_hashed,
                stats.cache_hits
            );
        }

        let (groups, grouping) = group_by_fingerprint(confirmed);

        let counters = hasher.counters();
        stats.partial_reads = counters.partial_reads;
        stats.full_reads = counters.full_reads;
        stats.bytes_read = counters.bytes_read;
        stats.duration = started.elapsed();

        diagnostics.sort_by(|a, b| a.path.cmp(&b.path).then(a.kind.cmp(&b.kind)));

        let cut_short = walk.interrupted || stats.abandoned > 0 || full_pass_skipped;
        let status = if cut_short {
            if token.is_timed_out() {
                log::warn!("Scan timed out after {:?}", stats.duration);
            }
            ScanStatus::Cancelled
        } else {
            ScanStatus::Completed
        };

        log::info!(
            "Scan {}: {} duplicate groups, {} redundant files, {} reclaimable, {} diagnostics in {:.2?}",
            if status == ScanStatus::Completed { "complete" } else { "cancelled" },
            grouping.group_count,
            grouping.duplicate_files,
            ByteSize(grouping.wasted_space),
            diagnostics.len(),
            stats.duration
        );

        Ok(ScanResult {
            root,
            status,
            files_visited: walk.files_visited,
            bytes_visited: walk.bytes_visited,
            groups,
            duplicate_files: grouping.duplicate_files,
            wasted_space: grouping.wasted_space,
            diagnostics,
            file_types: walk.file_types,
            stats,
        })
    }
}

/// Count a cache-served or fresh full-tier result and store the fresh ones.
fn record_cache_use(
    cache: &dyn MetadataCache,
    file: &FileDescriptor,
    outcome: HashOutcome,
    stats: &mut ScanStats,
) {
    if outcome.cached {
        stats.cache_hits += 1;
        return;
    }
    stats.cache_misses += 1;
    if let Err(e) = cache.store(&CacheEntry::new(file, outcome.fingerprint)) {
        stats.cache_write_failures += 1;
        log::warn!("Failed to cache hash for {}: {}", file.path.display(), e);
    }
}

fn record_failure(error: &HashError, stats: &mut ScanStats, diagnostics: &mut Vec<Diagnostic>) {
    match error.to_diagnostic() {
        Some(diagnostic) => {
            log::warn!("Failed to hash {}", diagnostic);
            stats.failed += 1;
            diagnostics.push(diagnostic);
        }
        None => stats.abandoned += 1,
    }
}
