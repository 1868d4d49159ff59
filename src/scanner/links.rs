//! Recognising paths that name the same underlying file.
//!
//! Hard links, and symlinks when links are followed, give one file several
//! paths. Hashing each of them would report the file as a duplicate of
//! itself, so the scan keeps only the first path seen for each file.
//!
//! Identity is the `(device, inode)` pair on Unix. Other platforms report no
//! identity and every path is treated as a distinct file.

use std::collections::HashSet;
use std::fs::Metadata;

use super::FileDescriptor;

/// Identity of a file on disk, independent of the path used to reach it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId {
    device: u64,
    inode: u64,
}

impl FileId {
    #[cfg(unix)]
    #[must_use]
    pub fn from_metadata(metadata: &Metadata) -> Option<Self> {
        use std::os::unix::fs::MetadataExt;
        Some(Self {
            device: metadata.dev(),
            inode: metadata.ino(),
        })
    }

    #[cfg(not(unix))]
    #[must_use]
    pub fn from_metadata(_metadata: &Metadata) -> Option<Self> {
        None
    }
}

/// Remembers which files the scan has already accepted.
///
/// Owned by the single producer, so no synchronisation.
#[derive(Debug, Default)]
pub struct LinkTracker {
    seen: HashSet<FileId>,
}

impl LinkTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` the first time a file is offered, `false` for every later path
    /// to the same file. Files without an identity are always new.
    pub fn first_sighting(&mut self, file: &FileDescriptor) -> bool {
        match file.file_id {
            Some(id) => self.seen.insert(id),
            None => true,
        }
    }

    /// Distinct files recorded so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
