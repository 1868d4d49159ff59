use dupetree::progress::ProgressCallback;
use dupetree::{scan_with_cancel, CancellationToken, DuplicateFinder, ScanConfig};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::tempdir;

/// Cancels the scan once `after` items have completed.
struct CancelAfter {
    token: CancellationToken,
    after: usize,
}

impl ProgressCallback for CancelAfter {
    fn on_phase_start(&self, _phase: &str, _total: usize) {}

    fn on_progress(&self, current: usize, _path: &str) {
        if current >= self.after {
            self.token.cancel();
        }
    }

    fn on_phase_end(&self, _phase: &str) {}
}

fn create_many(dir: &Path, count: usize) {
    for i in 0..count {
        let sub = dir.join(format!("d{:02}", i % 20));
        fs::create_dir_all(&sub).unwrap();
        fs::write(sub.join(format!("f{i:05}.txt")), format!("content {}", i % 50)).unwrap();
    }
}

#[test]
fn test_pre_cancelled_scan_returns_empty_cancelled_result() {
    let dir = tempdir().unwrap();
    create_many(dir.path(), 50);

    let token = CancellationToken::new();
    token.cancel();
    let result = scan_with_cancel(dir.path(), &ScanConfig::default(), token).unwrap();

    assert!(result.is_cancelled());
    assert!(result.groups.is_empty());
    assert_eq!(result.stats.candidates, 0);
}

#[test]
fn test_cancel_mid_scan() {
    let dir = tempdir().unwrap();
    create_many(dir.path(), 2000);

    let token = CancellationToken::new();
    let callback = Arc::new(CancelAfter {
        token: token.clone(),
        after: 50,
    });
    let config = ScanConfig::default().with_workers(2).with_queue_capacity(4);
    let finder = DuplicateFinder::new(config)
        .unwrap()
        .with_cancellation(token)
        .with_progress_callback(callback);

    let started = Instant::now();
    let result = finder.scan(dir.path()).unwrap();

    assert!(started.elapsed() < Duration::from_secs(30));
    assert!(result.is_cancelled());
    assert!(result.stats.candidates < 2000);
    assert_eq!(
        result.stats.partial_hashed + result.stats.failed + result.stats.abandoned,
        result.stats.candidates
    );
}

#[test]
fn test_cancelled_groups_are_subset_of_complete_groups() {
    let dir = tempdir().unwrap();
    create_many(dir.path(), 1000);

    let complete = DuplicateFinder::new(ScanConfig::default())
        .unwrap()
        .scan(dir.path())
        .unwrap();
    let members: HashMap<_, _> = complete
        .groups
        .iter()
        .map(|g| (g.fingerprint, g.paths().into_iter().map(Path::to_path_buf).collect::<Vec<_>>()))
        .collect();

    let token = CancellationToken::new();
    let callback = Arc::new(CancelAfter {
        token: token.clone(),
        after: 300,
    });
    let config = ScanConfig::default().with_workers(2).with_queue_capacity(4);
    let partial = DuplicateFinder::new(config)
        .unwrap()
        .with_cancellation(token)
        .with_progress_callback(callback)
        .scan(dir.path())
        .unwrap();

    assert!(partial.is_cancelled());
    for group in &partial.groups {
        let full = members
            .get(&group.fingerprint)
            .expect("group must exist in complete scan");
        for path in group.paths() {
            assert!(full.iter().any(|p| p == path));
        }
    }
}

#[test]
fn test_zero_timeout_cancels_immediately() {
    let dir = tempdir().unwrap();
    create_many(dir.path(), 20);

    let config = ScanConfig::default().with_timeout(Duration::ZERO);
    let result = DuplicateFinder::new(config).unwrap().scan(dir.path()).unwrap();

    assert!(result.is_cancelled());
    assert!(result.groups.is_empty());
}

#[test]
fn test_generous_timeout_completes() {
    let dir = tempdir().unwrap();
    create_many(dir.path(), 20);

    let config = ScanConfig::default().with_timeout(Duration::from_secs(600));
    let result = DuplicateFinder::new(config).unwrap().scan(dir.path()).unwrap();

    assert!(result.is_completed());
    assert_eq!(result.files_visited, 20);
}

#[test]
fn test_timeout_does_not_cancel_caller_token() {
    let dir = tempdir().unwrap();
    create_many(dir.path(), 5);

    let token = CancellationToken::new();
    let config = ScanConfig::default().with_timeout(Duration::ZERO);
    let result = scan_with_cancel(dir.path(), &config, token.clone()).unwrap();

    assert!(result.is_cancelled());
    assert!(!token.is_cancelled());
}
