use dupetree::cache::{open_or_recover, CacheError, HashCache};
use dupetree::{DiagnosticKind, DuplicateFinder, ScanConfig};
use std::fs;
use tempfile::tempdir;

fn write_garbage(path: &std::path::Path) {
    fs::write(path, vec![0xA5u8; 4096]).unwrap();
}

#[test]
fn test_open_corrupted_database() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cache.db");
    write_garbage(&path);

    let res = HashCache::open(&path);
    assert!(matches!(res, Err(CacheError::Corrupt { .. })));
}

#[test]
fn test_recovery_replaces_corrupt_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cache.db");
    write_garbage(&path);

    let opened = open_or_recover(&path);
    let diagnostic = opened.diagnostic.expect("corruption should be reported");
    assert_eq!(diagnostic.kind, DiagnosticKind::CacheCorruption);

    // The recreated file is a valid, empty cache.
    let cache = HashCache::open(&path).unwrap();
    assert!(cache.is_empty().unwrap());
}

#[test]
fn test_scan_survives_corrupt_cache() {
    let dir = tempdir().unwrap();
    let cache_dir = tempdir().unwrap();
    let cache_path = cache_dir.path().join("cache.db");
    write_garbage(&cache_path);

    let content = vec![3u8; 30 * 1024];
    fs::write(dir.path().join("a.bin"), &content).unwrap();
    fs::write(dir.path().join("b.bin"), &content).unwrap();

    let config = ScanConfig::default().with_cache_location(&cache_path);
    let finder = DuplicateFinder::new(config).unwrap();

    let first = finder.scan(dir.path()).unwrap();
    assert!(first.is_completed());
    assert_eq!(first.groups.len(), 1);
    assert_eq!(first.diagnostics.len(), 1);
    assert_eq!(first.diagnostics[0].kind, DiagnosticKind::CacheCorruption);

    // The next scan uses the recreated cache without complaint.
    let second = finder.scan(dir.path()).unwrap();
    assert!(second.diagnostics.is_empty());
    assert_eq!(second.stats.cache_hits, 2);
}

#[cfg(unix)]
#[test]
fn test_unusable_cache_location_falls_back_to_memory() {
    let dir = tempdir().unwrap();
    // A directory where the database file should be cannot be opened or removed.
    let cache_path = dir.path().join("cache.db");
    fs::create_dir(&cache_path).unwrap();

    let content = vec![4u8; 30 * 1024];
    let tree = tempdir().unwrap();
    fs::write(tree.path().join("a.bin"), &content).unwrap();
    fs::write(tree.path().join("b.bin"), &content).unwrap();

    let config = ScanConfig::default().with_cache_location(&cache_path);
    let result = DuplicateFinder::new(config).unwrap().scan(tree.path()).unwrap();

    assert!(result.is_completed());
    assert_eq!(result.groups.len(), 1);
    assert_eq!(result.diagnostics.len(), 1);
    assert_eq!(result.diagnostics[0].kind, DiagnosticKind::CacheCorruption);
}
