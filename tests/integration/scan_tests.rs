use dupetree::{scan, DuplicateFinder, ScanConfig};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use tempfile::tempdir;

fn write(path: &Path, content: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    File::create(path).unwrap().write_all(content).unwrap();
}

fn names(paths: Vec<&Path>) -> Vec<String> {
    let mut names: Vec<String> = paths
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn test_scan_empty_directory() {
    let dir = tempdir().unwrap();

    let result = scan(dir.path(), &ScanConfig::default()).unwrap();

    assert!(result.is_completed());
    assert!(result.groups.is_empty());
    assert!(result.diagnostics.is_empty());
    assert_eq!(result.files_visited, 0);
    assert_eq!(result.wasted_space, 0);
}

#[test]
fn test_scan_unique_files() {
    let dir = tempdir().unwrap();
    write(&dir.path().join("a.txt"), b"content a");
    write(&dir.path().join("b.txt"), b"content b");
    write(&dir.path().join("c.txt"), b"content c");

    let result = scan(dir.path(), &ScanConfig::default()).unwrap();

    assert!(result.groups.is_empty());
    assert_eq!(result.files_visited, 3);
}

#[test]
fn test_scan_duplicate_files() {
    let dir = tempdir().unwrap();
    write(&dir.path().join("a.txt"), b"hello");
    write(&dir.path().join("b.txt"), b"hello");
    write(&dir.path().join("c.txt"), b"world");

    let result = scan(dir.path(), &ScanConfig::default().with_workers(2)).unwrap();

    assert_eq!(result.groups.len(), 1);
    assert_eq!(names(result.groups[0].paths()), vec!["a.txt", "b.txt"]);
    assert_eq!(result.groups[0].size, 5);
    assert_eq!(result.wasted_space, 5);
    assert_eq!(result.duplicate_files, 1);
}

#[test]
fn test_scan_nested_duplicates() {
    let dir = tempdir().unwrap();
    let content = vec![7u8; 50_000];
    write(&dir.path().join("top.bin"), &content);
    write(&dir.path().join("a/b/c/deep.bin"), &content);
    write(&dir.path().join("a/other.bin"), &content);

    let result = scan(dir.path(), &ScanConfig::default()).unwrap();

    assert_eq!(result.groups.len(), 1);
    assert_eq!(result.groups[0].len(), 3);
    assert_eq!(result.wasted_space, 100_000);
    assert_eq!(result.duplicate_files, 2);
}

#[test]
fn test_group_members_are_byte_identical() {
    let dir = tempdir().unwrap();
    let base: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
    let mut tweaked = base.clone();
    tweaked[50_000] ^= 0xFF;
    write(&dir.path().join("one.bin"), &base);
    write(&dir.path().join("two.bin"), &base);
    write(&dir.path().join("three.bin"), &tweaked);
    write(&dir.path().join("four.bin"), &tweaked);

    let result = scan(dir.path(), &ScanConfig::default()).unwrap();

    assert_eq!(result.groups.len(), 2);
    for group in &result.groups {
        let first = fs::read(&group.files[0].path).unwrap();
        for file in &group.files[1..] {
            assert_eq!(fs::read(&file.path).unwrap(), first);
        }
    }
}

#[test]
fn test_no_path_in_two_groups() {
    let dir = tempdir().unwrap();
    for i in 0..10 {
        write(&dir.path().join(format!("x{i}.txt")), format!("{}", i % 3).as_bytes());
    }

    let result = scan(dir.path(), &ScanConfig::default()).unwrap();

    let mut all: Vec<_> = result
        .groups
        .iter()
        .flat_map(|g| g.files.iter().map(|f| f.path.clone()))
        .collect();
    let total = all.len();
    all.sort();
    all.dedup();
    assert_eq!(all.len(), total);
    assert_eq!(result.groups.len(), 3);
}

#[test]
fn test_max_depth_limits_traversal() {
    let dir = tempdir().unwrap();
    write(&dir.path().join("a.txt"), b"same");
    write(&dir.path().join("sub/b.txt"), b"same");
    write(&dir.path().join("sub/deeper/c.txt"), b"same");

    let config = ScanConfig::default().with_max_depth(1);
    let result = scan(dir.path(), &config).unwrap();
    assert_eq!(result.files_visited, 1);
    assert!(result.groups.is_empty());

    let config = ScanConfig::default().with_max_depth(2);
    let result = scan(dir.path(), &config).unwrap();
    assert_eq!(result.files_visited, 2);
    assert_eq!(result.groups[0].len(), 2);
}

#[test]
fn test_exclude_patterns() {
    let dir = tempdir().unwrap();
    write(&dir.path().join("keep.txt"), b"same");
    write(&dir.path().join("also.txt"), b"same");
    write(&dir.path().join("skip.log"), b"same");
    write(&dir.path().join("node_modules/pkg/index.txt"), b"same");

    let config = ScanConfig::default()
        .with_exclude_patterns(vec!["*.log".to_string(), "node_modules".to_string()]);
    let result = scan(dir.path(), &config).unwrap();

    assert_eq!(result.files_visited, 2);
    assert_eq!(names(result.groups[0].paths()), vec!["also.txt", "keep.txt"]);
}

#[test]
fn test_hidden_files_excluded_by_default() {
    let dir = tempdir().unwrap();
    write(&dir.path().join("visible.txt"), b"same");
    write(&dir.path().join(".hidden.txt"), b"same");
    write(&dir.path().join(".git/config"), b"same");

    let result = scan(dir.path(), &ScanConfig::default()).unwrap();
    assert_eq!(result.files_visited, 1);
    assert!(result.groups.is_empty());

    let config = ScanConfig {
        include_hidden: true,
        ..ScanConfig::default()
    };
    let result = scan(dir.path(), &config).unwrap();
    assert_eq!(result.files_visited, 3);
    assert_eq!(result.groups[0].len(), 3);
}

#[test]
fn test_unique_partial_fingerprints_skip_full_reads() {
    let dir = tempdir().unwrap();
    for i in 0..5u8 {
        write(&dir.path().join(format!("f{i}.bin")), &vec![i; 100_000]);
    }

    let result = scan(dir.path(), &ScanConfig::default()).unwrap();

    assert!(result.groups.is_empty());
    assert_eq!(result.stats.partial_reads, 5);
    assert_eq!(result.stats.full_reads, 0);
}

#[test]
fn test_only_colliding_files_are_read_fully() {
    let dir = tempdir().unwrap();
    let shared = vec![1u8; 100_000];
    write(&dir.path().join("dup1.bin"), &shared);
    write(&dir.path().join("dup2.bin"), &shared);
    write(&dir.path().join("unique.bin"), &vec![2u8; 100_000]);
    write(&dir.path().join("other_size.bin"), &vec![1u8; 99_999]);

    let result = scan(dir.path(), &ScanConfig::default()).unwrap();

    assert_eq!(result.groups.len(), 1);
    assert_eq!(result.stats.promoted, 2);
    assert_eq!(result.stats.full_reads, 2);
}

#[test]
fn test_sort_by_discovery_is_stable_across_runs() {
    let dir = tempdir().unwrap();
    for i in 0..20 {
        write(&dir.path().join(format!("d{}/f{i}.txt", i % 4)), format!("{}", i % 5).as_bytes());
    }
    let finder = DuplicateFinder::new(ScanConfig::default().with_workers(4)).unwrap();

    let mut first = finder.scan(dir.path()).unwrap();
    let mut second = finder.scan(dir.path()).unwrap();
    first.sort_by_discovery();
    second.sort_by_discovery();

    let paths = |r: &dupetree::ScanResult| -> Vec<Vec<std::path::PathBuf>> {
        r.groups
            .iter()
            .map(|g| g.files.iter().map(|f| f.path.clone()).collect())
            .collect()
    };
    assert_eq!(paths(&first), paths(&second));
}

#[test]
fn test_default_min_size_ignores_empty_files() {
    let dir = tempdir().unwrap();
    File::create(dir.path().join("empty1.txt")).unwrap();
    File::create(dir.path().join("empty2.txt")).unwrap();

    let result = scan(dir.path(), &ScanConfig::default()).unwrap();

    assert!(result.groups.is_empty());
    assert_eq!(result.files_visited, 2);
    assert_eq!(result.stats.below_min_size, 2);
}
