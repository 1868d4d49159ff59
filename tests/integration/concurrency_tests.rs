use dupetree::scanner::Fingerprint;
use dupetree::{DuplicateFinder, ScanConfig};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn sorted_groups(result: &mut dupetree::ScanResult) -> Vec<Vec<PathBuf>> {
    result.sort_by_discovery();
    result
        .groups
        .iter()
        .map(|g| g.paths().into_iter().map(Path::to_path_buf).collect())
        .collect()
}

#[test]
fn test_many_empty_files_bounded_in_flight() {
    let dir = tempdir().unwrap();
    let count: u64 = 20_000;
    for i in 0..count {
        let sub = dir.path().join(format!("{:03}", i % 100));
        if i < 100 {
            fs::create_dir(&sub).unwrap();
        }
        File::create(sub.join(format!("{i}"))).unwrap();
    }

    let workers = 4;
    let capacity = 8;
    let config = ScanConfig::default()
        .with_workers(workers)
        .with_queue_capacity(capacity)
        .with_min_file_size(0);
    let result = DuplicateFinder::new(config).unwrap().scan(dir.path()).unwrap();

    assert!(result.is_completed());
    assert_eq!(result.stats.candidates, count);
    assert_eq!(result.stats.partial_hashed + result.stats.failed, count);
    assert!(result.stats.peak_in_flight <= capacity + workers);
    assert_eq!(result.groups.len(), 1);
    assert_eq!(result.groups[0].len(), count as usize);
    assert_eq!(result.groups[0].fingerprint, Fingerprint::empty());
    assert_eq!(result.stats.bytes_read, 0);
}

#[test]
fn test_worker_count_does_not_change_result() {
    let dir = tempdir().unwrap();
    for i in 0..300 {
        let size = 1000 + (i % 7) * 5000;
        let byte = (i % 3) as u8;
        fs::write(dir.path().join(format!("f{i:03}.bin")), vec![byte; size]).unwrap();
    }

    let mut single = DuplicateFinder::new(ScanConfig::default().with_workers(1))
        .unwrap()
        .scan(dir.path())
        .unwrap();
    let mut many = DuplicateFinder::new(ScanConfig::default().with_workers(8).with_queue_capacity(2))
        .unwrap()
        .scan(dir.path())
        .unwrap();

    assert_eq!(single.wasted_space, many.wasted_space);
    assert_eq!(sorted_groups(&mut single), sorted_groups(&mut many));
}

#[test]
fn test_every_candidate_accounted_for() {
    let dir = tempdir().unwrap();
    for i in 0..500 {
        fs::write(dir.path().join(format!("{i}.dat")), vec![(i % 10) as u8; 8192]).unwrap();
    }

    let result = DuplicateFinder::new(ScanConfig::default().with_workers(3))
        .unwrap()
        .scan(dir.path())
        .unwrap();

    assert_eq!(result.stats.candidates, 500);
    assert_eq!(result.stats.partial_hashed, 500);
    assert_eq!(result.stats.abandoned, 0);
    assert_eq!(result.stats.promoted, 500);
    assert_eq!(result.stats.full_hashed, 500);
    assert_eq!(result.groups.len(), 10);
    assert_eq!(result.duplicate_files, 490);
}
