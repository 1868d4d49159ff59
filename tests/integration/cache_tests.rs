use dupetree::cache::{HashCache, MemoryCache, MetadataCache};
use dupetree::{DuplicateFinder, ScanConfig};
use filetime::{set_file_mtime, FileTime};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

const SIZE: usize = 40 * 1024;

/// Two identical files plus one that shares head and tail but differs in the
/// middle, so all three need a full pass.
fn create_tree(dir: &Path) {
    let base = vec![0x11u8; SIZE];
    let mut variant = base.clone();
    variant[SIZE / 2] = 0x22;
    fs::write(dir.join("a.bin"), &base).unwrap();
    fs::write(dir.join("b.bin"), &base).unwrap();
    fs::write(dir.join("c.bin"), &variant).unwrap();
}

#[test]
fn test_cache_initial_scan_and_rescan() {
    let dir = tempdir().unwrap();
    let cache_dir = tempdir().unwrap();
    create_tree(dir.path());

    let config = ScanConfig::default().with_cache_location(cache_dir.path().join("cache.db"));
    let finder = DuplicateFinder::new(config).unwrap();

    let first = finder.scan(dir.path()).unwrap();
    assert_eq!(first.groups.len(), 1);
    assert_eq!(first.stats.promoted, 3);
    assert_eq!(first.stats.cache_hits, 0);
    assert_eq!(first.stats.cache_misses, 3);
    assert_eq!(first.stats.full_reads, 3);

    let second = finder.scan(dir.path()).unwrap();
    assert_eq!(second.stats.cache_hits, 3);
    assert_eq!(second.stats.cache_misses, 0);
    assert!(second.stats.full_reads < first.stats.full_reads);
    assert_eq!(second.groups.len(), 1);
    assert_eq!(first.groups[0].fingerprint, second.groups[0].fingerprint);
}

#[test]
fn test_cache_persists_across_finders() {
    let dir = tempdir().unwrap();
    let cache_dir = tempdir().unwrap();
    let cache_path = cache_dir.path().join("cache.db");
    create_tree(dir.path());

    let config = ScanConfig::default().with_cache_location(&cache_path);
    DuplicateFinder::new(config.clone())
        .unwrap()
        .scan(dir.path())
        .unwrap();

    let cache = HashCache::open(&cache_path).unwrap();
    assert_eq!(cache.len().unwrap(), 3);
    drop(cache);

    let result = DuplicateFinder::new(config).unwrap().scan(dir.path()).unwrap();
    assert_eq!(result.stats.cache_hits, 3);
    assert_eq!(result.stats.full_reads, 0);
}

#[test]
fn test_cache_invalidation_on_change() {
    let dir = tempdir().unwrap();
    create_tree(dir.path());

    let cache = Arc::new(MemoryCache::new());
    let finder = DuplicateFinder::new(ScanConfig::default())
        .unwrap()
        .with_cache(cache.clone());

    let first = finder.scan(dir.path()).unwrap();
    assert_eq!(first.groups[0].len(), 2);
    assert_eq!(cache.len(), 3);

    // Make c.bin identical to the others, with a distinct mtime.
    let c = dir.path().join("c.bin");
    fs::write(&c, vec![0x11u8; SIZE]).unwrap();
    set_file_mtime(&c, FileTime::from_unix_time(1_000_000_000, 0)).unwrap();

    let second = finder.scan(dir.path()).unwrap();
    assert_eq!(second.stats.cache_hits, 2);
    assert_eq!(second.stats.cache_misses, 1);
    assert_eq!(second.stats.full_reads, 1);
    assert_eq!(second.groups.len(), 1);
    assert_eq!(second.groups[0].len(), 3);
}

#[test]
fn test_same_size_and_mtime_trusts_cache() {
    // A content change that preserves size and mtime is not detected. This
    // is the documented contract of a metadata cache.
    let dir = tempdir().unwrap();
    create_tree(dir.path());
    let c = dir.path().join("c.bin");
    let pinned = FileTime::from_unix_time(1_200_000_000, 0);
    set_file_mtime(&c, pinned).unwrap();

    let cache = Arc::new(MemoryCache::new());
    let finder = DuplicateFinder::new(ScanConfig::default())
        .unwrap()
        .with_cache(cache.clone());
    let mut first = finder.scan(dir.path()).unwrap();

    fs::write(&c, vec![0x11u8; SIZE]).unwrap();
    set_file_mtime(&c, pinned).unwrap();

    let mut second = finder.scan(dir.path()).unwrap();
    assert_eq!(second.stats.cache_hits, 3);
    first.sort_by_discovery();
    second.sort_by_discovery();
    assert_eq!(second.groups, first.groups);
}

#[test]
fn test_cache_not_used_when_disabled() {
    let dir = tempdir().unwrap();
    create_tree(dir.path());

    let result = DuplicateFinder::new(ScanConfig::default())
        .unwrap()
        .scan(dir.path())
        .unwrap();

    assert_eq!(result.stats.cache_hits, 0);
    assert_eq!(result.stats.cache_misses, 0);
    assert_eq!(result.stats.full_reads, 3);
}

#[test]
fn test_prune_missing_removes_deleted_files() {
    let dir = tempdir().unwrap();
    let cache_dir = tempdir().unwrap();
    let cache_path = cache_dir.path().join("cache.db");
    create_tree(dir.path());

    let config = ScanConfig::default().with_cache_location(&cache_path);
    DuplicateFinder::new(config).unwrap().scan(dir.path()).unwrap();
    fs::remove_file(dir.path().join("b.bin")).unwrap();

    let cache = HashCache::open(&cache_path).unwrap();
    assert_eq!(cache.prune_missing().unwrap(), 1);
    assert_eq!(cache.len().unwrap(), 2);
    let a = dir.path().canonicalize().unwrap().join("a.bin");
    let meta = fs::metadata(&a).unwrap();
    assert!(cache
        .lookup(&a, meta.len(), meta.modified().unwrap())
        .unwrap()
        .is_some());
}

/// File names that differ only in bytes that are not valid UTF-8 must keep
/// separate cache entries.
#[cfg(target_os = "linux")]
#[test]
fn test_non_utf8_names_keep_separate_entries() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let dir = tempdir().unwrap();
    let cache_dir = tempdir().unwrap();
    let base = vec![0x33u8; SIZE];
    let mut variant = base.clone();
    variant[SIZE / 2] = 0x44;

    let ff = dir.path().join(OsStr::from_bytes(b"\xff.bin"));
    let fe = dir.path().join(OsStr::from_bytes(b"\xfe.bin"));
    fs::write(&ff, &base).unwrap();
    fs::write(&fe, &variant).unwrap();
    let mtime = FileTime::from_unix_time(1_600_000_000, 0);
    set_file_mtime(&ff, mtime).unwrap();
    set_file_mtime(&fe, mtime).unwrap();

    let config = ScanConfig::default().with_cache_location(cache_dir.path().join("cache.db"));
    let finder = DuplicateFinder::new(config).unwrap();

    let first = finder.scan(dir.path()).unwrap();
    assert_eq!(first.stats.promoted, 2);
    assert_eq!(first.stats.cache_misses, 2);
    assert!(first.groups.is_empty());

    let second = finder.scan(dir.path()).unwrap();
    assert_eq!(second.stats.cache_hits, 2);
    assert!(second.groups.is_empty());

    let cache = HashCache::open(&cache_dir.path().join("cache.db")).unwrap();
    assert_eq!(cache.len().unwrap(), 2);
}

#[test]
fn test_small_files_use_persistent_cache() {
    let dir = tempdir().unwrap();
    let cache_dir = tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), b"hello").unwrap();
    fs::write(dir.path().join("b.txt"), b"hello").unwrap();
    fs::write(dir.path().join("c.txt"), b"world").unwrap();

    let config = ScanConfig::default().with_cache_location(cache_dir.path().join("cache.db"));
    let finder = DuplicateFinder::new(config).unwrap();

    let first = finder.scan(dir.path()).unwrap();
    assert_eq!(first.stats.cache_misses, 3);
    assert_eq!(first.stats.partial_reads, 3);
    assert_eq!(first.groups.len(), 1);

    let second = finder.scan(dir.path()).unwrap();
    assert_eq!(second.stats.cache_hits, 3);
    assert_eq!(second.stats.partial_reads, 0);
    assert!(second.stats.bytes_read < first.stats.bytes_read);
    assert_eq!(second.groups.len(), 1);
    assert_eq!(second.groups[0].len(), 2);
}
