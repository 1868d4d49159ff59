//! Duplicate grouping and wasted-space statistics.
//!
//! # Overview
//!
//! [`group_by_fingerprint`] takes the successful full-tier results of a scan
//! and forms [`DuplicateGroup`]s: every fingerprint shared by two or more
//! files becomes one group. Members keep the order in which their results
//! arrived; groups are ordered largest wasted space first.
//!
//! # Example
//!
//! ```
//! use dupetree::duplicates::group_by_fingerprint;
//! use dupetree::scanner::{FileDescriptor, Fingerprint};
//! use std::time::SystemTime;
//!
//! let hello = Fingerprint::full(*blake3::hash(b"hello").as_bytes(), 5);
//! let world = Fingerprint::full(*blake3::hash(b"world").as_bytes(), 5);
//! let results = vec![
//!     (FileDescriptor::new("/a.txt".into(), 5, SystemTime::now()), hello),
//!     (FileDescriptor::new("/b.txt".into(), 5, SystemTime::now()), hello),
//!     (FileDescriptor::new("/c.txt".into(), 5, SystemTime::now()), world),
//! ];
//!
//! let (groups, stats) = group_by_fingerprint(results);
//! assert_eq!(groups.len(), 1);
//! assert_eq!(stats.duplicate_files, 1);
//! assert_eq!(stats.wasted_space, 5);
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::Serialize;

use crate::scanner::{FileDescriptor, Fingerprint};

/// Two or more files with the same full-tier fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    /// Shared content fingerprint
    pub fingerprint: Fingerprint,
    /// File size in bytes (identical for every member)
    pub size: u64,
    /// Members in first-seen order
    pub files: Vec<FileDescriptor>,
}

impl DuplicateGroup {
    #[must_use]
    pub fn new(fingerprint: Fingerprint, files: Vec<FileDescriptor>) -> Self {
        Self {
            size: fingerprint.size,
            fingerprint,
            files,
        }
    }

    /// Number of files in this group.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Total size of all copies.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.size * self.files.len() as u64
    }

    /// Number of redundant copies (all but one).
    #[must_use]
    pub fn duplicate_count(&self) -> usize {
        self.files.len().saturating_sub(1)
    }

    /// Bytes that would be reclaimed by keeping a single copy.
    #[must_use]
    pub fn wasted_space(&self) -> u64 {
        self.size * self.duplicate_count() as u64
    }

    /// Member paths, in member order.
    #[must_use]
    pub fn paths(&self) -> Vec<&Path> {
        self.files.iter().map(|f| f.path.as_path()).collect()
    }

    /// Hex rendering of the shared hash.
    #[must_use]
    pub fn hash_hex(&self) -> String {
        self.fingerprint.hash_hex()
    }

    /// Reorder members by discovery order.
    pub fn sort_by_discovery(&mut self) {
        self.files.sort_by_key(|f| f.ordinal);
    }

    /// Ordinal of the earliest discovered member.
    #[must_use]
    pub fn first_ordinal(&self) -> u64 {
        self.files.iter().map(|f| f.ordinal).min().unwrap_or(u64::MAX)
    }
}

/// Aggregate statistics over a set of groups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GroupingStats {
    /// Number of duplicate groups
    pub group_count: usize,
    /// Redundant copies across all groups (members minus one, summed)
    pub duplicate_files: usize,
    /// Sum over groups of `(members - 1) * size`
    pub wasted_space: u64,
}

impl GroupingStats {
    #[must_use]
    pub fn from_groups(groups: &[DuplicateGroup]) -> Self {
        groups.iter().fold(Self::default(), |mut stats, group| {
            stats.group_count += 1;
            stats.duplicate_files += group.duplicate_count();
            stats.wasted_space += group.wasted_space();
            stats
        })
    }
}

/// Bucket results by fingerprint, keeping keys and members in first-seen order.
pub(crate) fn bucket_by_fingerprint<I>(results: I) -> Vec<(Fingerprint, Vec<FileDescriptor>)>
where
    I: IntoIterator<Item = (FileDescriptor, Fingerprint)>,
{
    let mut index: HashMap<Fingerprint, usize> = HashMap::new();
    let mut buckets: Vec<(Fingerprint, Vec<FileDescriptor>)> = Vec::new();

    for (file, fingerprint) in results {
        match index.get(&fingerprint) {
            Some(&i) => buckets[i].1.push(file),
            None => {
                index.insert(fingerprint, buckets.len());
                buckets.push((fingerprint, vec![file]));
            }
        }
    }
    buckets
}

/// Group full-tier results into duplicate groups.
///
/// Fingerprints held by a single file are dropped. Groups are sorted by
/// wasted space (largest first), ties broken by earliest discovery.
pub fn group_by_fingerprint<I>(results: I) -> (Vec<DuplicateGroup>, GroupingStats)
where
    I: IntoIterator<Item = (FileDescriptor, Fingerprint)>,
{
    let mut groups: Vec<DuplicateGroup> = bucket_by_fingerprint(results)
        .into_iter()
        .filter(|(_, files)| files.len() > 1)
        .map(|(fingerprint, files)| {
            debug_assert!(fingerprint.is_full(), "grouping requires full fingerprints");
            DuplicateGroup::new(fingerprint, files)
        })
        .collect();

    sort_groups(&mut groups);
    let stats = GroupingStats::from_groups(&groups);
    log::debug!(
        "Grouping complete: {} groups, {} redundant copies",
        stats.group_count,
        stats.duplicate_files
    );
    (groups, stats)
}

/// Largest wasted space first, then earliest discovery.
pub fn sort_groups(groups: &mut [DuplicateGroup]) {
    groups.sort_by(|a, b| {
        b.wasted_space()
            .cmp(&a.wasted_space())
            .then_with(|| a.first_ordinal().cmp(&b.first_ordinal()))
    });
}
