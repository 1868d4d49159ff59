//! Directory walker built on walkdir.
//!
//! # Overview
//!
//! [`Walker`] enumerates a tree depth-first on a single thread and yields a
//! lazy sequence of [`FileDescriptor`]s. Children are visited in file-name
//! order so that discovery order (and therefore every ordinal) is stable from
//! run to run.
//!
//! # Filters
//!
//! - Depth limit, counted from the root (root = 0)
//! - Gitignore-style exclude patterns via the `ignore` crate; a matching
//!   directory is pruned and none of its contents are read
//! - Hidden entries (name starts with `.`), unless included
//! - Symlinks are not followed by default; when they are, every real
//!   directory is entered at most once
//!
//! The root itself is exempt from the hidden and pattern filters.
//!
//! Per-entry failures are yielded as [`ScanError`] values and iteration
//! continues with the next sibling.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use walkdir::{DirEntry, WalkDir};

use super::{FileDescriptor, FileId, ScanError, WalkerConfig};
use crate::cancel::CancellationToken;

/// Single-producer directory walker.
#[derive(Debug)]
pub struct Walker {
    /// Root path to walk
    root: PathBuf,
    /// Walker configuration
    config: WalkerConfig,
    /// Stops iteration once cancelled
    cancel: Option<CancellationToken>,
    /// Set when cancellation cut a walk short
    interrupted: AtomicBool,
}

impl Walker {
    /// Create a new walker for the given path.
    ///
    /// ```no_run
    /// use dupetree::scanner::{Walker, WalkerConfig};
    /// use std::path::Path;
    ///
    /// let walker = Walker::new(Path::new("."), WalkerConfig::default());
    /// ```
    #[must_use]
    pub fn new(path: &Path, config: WalkerConfig) -> Self {
        Self {
            root: path.to_path_buf(),
            config,
            cancel: None,
            interrupted: AtomicBool::new(false),
        }
    }

    /// Stop yielding entries once `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn config(&self) -> &WalkerConfig {
        &self.config
    }

    /// Whether a discovered file should be fingerprinted at all.
    ///
    /// Files below the minimum size cannot be duplicates by definition.
    #[must_use]
    pub fn is_candidate(&self, file: &FileDescriptor) -> bool {
        file.size >= self.config.min_size
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    /// Whether the last walk stopped on cancellation before visiting every
    /// entry. A walk that ran out of entries is never interrupted.
    #[must_use]
    pub fn was_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Build the exclude matcher. Patterns were validated with the config, so
    /// a failure here only drops the offending pattern.
    fn build_gitignore(&self) -> Option<Gitignore> {
        if self.config.exclude_patterns.is_empty() {
            return None;
        }

        let mut builder = GitignoreBuilder::new(&self.root);
        for pattern in &self.config.exclude_patterns {
            if let Err(e) = builder.add_line(None, pattern) {
                log::warn!("Invalid exclude pattern '{}': {}", pattern, e);
            }
        }

        match builder.build() {
            Ok(gitignore) if gitignore.is_empty() => None,
            Ok(gitignore) => Some(gitignore),
            Err(e) => {
                log::warn!("Failed to build exclude patterns: {}", e);
                None
            }
        }
    }

    fn should_ignore(&self, path: &Path, is_dir: bool, gitignore: Option<&Gitignore>) -> bool {
        let Some(gi) = gitignore else {
            return false;
        };

        // Patterns are matched against the path relative to the root, with
        // forward slashes on every platform.
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        let path_str = relative.to_string_lossy();
        let normalized = if cfg!(windows) {
            path_str.replace('\\', "/")
        } else {
            path_str.into_owned()
        };

        gi.matched(normalized, is_dir).is_ignore()
    }

    /// Entry-level filter; returning `false` for a directory prunes it.
    fn keep_entry(
        &self,
        entry: &DirEntry,
        gitignore: Option<&Gitignore>,
        visited: &mut HashSet<PathBuf>,
    ) -> bool {
        if entry.depth() == 0 {
            if self.config.follow_symlinks {
                if let Ok(real) = entry.path().canonicalize() {
                    visited.insert(real);
                }
            }
            return true;
        }

        if !self.config.include_hidden && is_hidden(entry) {
            log::trace!("Skipping hidden entry: {}", entry.path().display());
            return false;
        }

        let is_dir = entry.file_type().is_dir();
        if self.should_ignore(entry.path(), is_dir, gitignore) {
            if is_dir {
                log::debug!("Pruning excluded directory: {}", entry.path().display());
            } else {
                log::trace!("Ignoring file: {}", entry.path().display());
            }
            return false;
        }

        if is_dir && self.config.follow_symlinks {
            if let Ok(real) = entry.path().canonicalize() {
                if !visited.insert(real) {
                    log::debug!(
                        "Skipping already visited directory: {}",
                        entry.path().display()
                    );
                    return false;
                }
            }
        }

        true
    }

    /// Walk the directory tree, yielding file descriptors.
    ///
    /// Every regular file that passes the filters is yielded, including files
    /// below the minimum size (use [`is_candidate`](Self::is_candidate) to
    /// tell them apart). Errors are yielded as [`ScanError`] values rather
    /// than stopping iteration.
    ///
    /// ```no_run
    /// use dupetree::scanner::{Walker, WalkerConfig};
    /// use std::path::Path;
    ///
    /// let walker = Walker::new(Path::new("."), WalkerConfig::default());
    /// let files: Vec<_> = walker.walk().filter_map(Result::ok).collect();
    /// println!("Found {} files", files.len());
    /// ```
    pub fn walk(&self) -> impl Iterator<Item = Result<FileDescriptor, ScanError>> + '_ {
        let gitignore = self.build_gitignore();
        let mut visited: HashSet<PathBuf> = HashSet::new();
        let mut next_ordinal: u64 = 0;
        self.interrupted.store(false, Ordering::SeqCst);

        let mut walk_dir = WalkDir::new(&self.root)
            .follow_links(self.config.follow_symlinks)
            .sort_by_file_name();
        if let Some(depth) = self.config.max_depth {
            walk_dir = walk_dir.max_depth(depth);
        }

        walk_dir
            .into_iter()
            .filter_entry(move |entry| self.keep_entry(entry, gitignore.as_ref(), &mut visited))
            .take_while(move |_| {
                let cancelled = self.is_cancelled();
                if cancelled {
                    log::debug!("Walker: cancellation requested, stopping iteration");
                    self.interrupted.store(true, Ordering::SeqCst);
                }
                !cancelled
            })
            .filter_map(move |result| {
                let item = match result {
                    Ok(entry) => self.process_entry(entry)?,
                    Err(e) => Err(self.handle_walk_error(e)?),
                };
                Some(item.map(|mut file| {
                    file.ordinal = next_ordinal;
                    next_ordinal += 1;
                    file
                }))
            })
    }

    fn process_entry(&self, entry: DirEntry) -> Option<Result<FileDescriptor, ScanError>> {
        let file_type = entry.file_type();
        if file_type.is_dir() {
            return None;
        }

        // Only reachable when links are not followed.
        if file_type.is_symlink() {
            if fs::metadata(entry.path()).is_err() {
                return self.unsupported(entry.path()).map(Err);
            }
            log::trace!("Skipping symlink: {}", entry.path().display());
            return None;
        }

        if !file_type.is_file() {
            return self.unsupported(entry.path()).map(Err);
        }

        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => return self.handle_walk_error(e).map(Err),
        };

        let depth = entry.depth();
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        log::trace!("Discovered {} ({} bytes)", entry.path().display(), metadata.len());

        Some(Ok(FileDescriptor {
            path: entry.into_path(),
            size: metadata.len(),
            modified,
            depth,
            ordinal: 0,
            file_id: FileId::from_metadata(&metadata),
        }))
    }

    fn unsupported(&self, path: &Path) -> Option<ScanError> {
        log::trace!("Skipping non-regular entry: {}", path.display());
        self.config
            .report_unsupported
            .then(|| ScanError::Unsupported(path.to_path_buf()))
    }

    /// Map a walkdir error. Symlink loops are not errors: the cycle guard
    /// simply declines to re-enter the directory.
    fn handle_walk_error(&self, error: walkdir::Error) -> Option<ScanError> {
        let path = error
            .path()
            .map_or_else(|| self.root.clone(), Path::to_path_buf);

        if let Some(ancestor) = error.loop_ancestor() {
            log::debug!(
                "Symlink cycle at {} (points back to {})",
                path.display(),
                ancestor.display()
            );
            return None;
        }

        let Some(io_error) = error.into_io_error() else {
            log::warn!("Walker error for {}", path.display());
            return Some(ScanError::Io {
                path,
                source: std::io::Error::other("directory walk error"),
            });
        };

        if io_error.kind() == std::io::ErrorKind::NotFound && is_broken_symlink(&path) {
            return self.unsupported(&path);
        }

        let error = ScanError::from_io(&path, io_error);
        match &error {
            ScanError::AccessDenied(_) => log::warn!("Permission denied: {}", path.display()),
            ScanError::Vanished(_) => {
                log::debug!("Entry vanished during walk: {}", path.display());
            }
            _ => log::warn!("{}", error),
        }
        Some(error)
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| name.starts_with('.'))
}

fn is_broken_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok_and(|m| m.file_type().is_symlink()) && fs::metadata(path).is_err()
}
