//! Duplicate detection.
//!
//! - [`scheduler`]: bounded fan-out/fan-in over a worker pool
//! - [`finder`]: the two-pass scan (partial fingerprints, then full hashes of promoted files)
//! - [`groups`]: grouping by full fingerprint and wasted-space statistics

pub mod finder;
pub mod groups;
pub mod scheduler;

pub use finder::{DuplicateFinder, FinderError, ScanResult, ScanStats, ScanStatus};
pub use groups::{group_by_fingerprint, DuplicateGroup, GroupingStats};
pub use scheduler::Scheduler;
