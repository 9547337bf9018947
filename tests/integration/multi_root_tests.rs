use crate::common::{write_file, CopyBackend};
use cowdupe::actions::{DedupExecutor, ReplaceConfig};
use cowdupe::duplicates::DuplicateFinder;
use std::fs;
use tempfile::tempdir;

#[test]
fn test_duplicates_across_roots() {
    let left = tempdir().unwrap();
    let right = tempdir().unwrap();
    write_file(left.path(), "photo.jpg", b"jpeg bytes");
    write_file(right.path(), "backup/photo.jpg", b"jpeg bytes");
    write_file(right.path(), "other.jpg", b"other bytes");

    let finder = DuplicateFinder::with_defaults();
    let (groups, summary) = finder
        .find_duplicates(&[left.path().to_path_buf(), right.path().to_path_buf()])
        .unwrap();

    assert_eq!(summary.roots.len(), 2);
    assert_eq!(summary.total_files, 3);
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].len(), 2);
}

#[cfg(unix)]
#[test]
fn test_nested_roots_count_files_once() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "a", b"same");
    write_file(dir.path(), "sub/b", b"same");

    let finder = DuplicateFinder::with_defaults();
    let (groups, summary) = finder
        .find_duplicates(&[dir.path().to_path_buf(), dir.path().join("sub")])
        .unwrap();

    assert_eq!(summary.total_files, 2);
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].len(), 2);
}

#[cfg(unix)]
#[test]
fn test_same_root_twice() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "a", b"twice");
    write_file(dir.path(), "b", b"twice");

    let finder = DuplicateFinder::with_defaults();
    let (groups, summary) = finder
        .find_duplicates(&[dir.path().to_path_buf(), dir.path().to_path_buf()])
        .unwrap();

    assert_eq!(summary.total_files, 2);
    assert_eq!(groups[0].len(), 2);
}

#[cfg(unix)]
#[test]
fn test_hardlinks_are_not_duplicates() {
    let dir = tempdir().unwrap();
    let original = write_file(dir.path(), "original", b"linked content");
    fs::hard_link(&original, dir.path().join("link")).unwrap();

    let finder = DuplicateFinder::with_defaults();
    let (groups, summary) = finder.find_duplicates(&[dir.path().to_path_buf()]).unwrap();

    assert_eq!(summary.total_files, 1);
    assert!(groups.is_empty());
}

#[test]
fn test_dedup_across_roots_keeps_both_paths() {
    let left = tempdir().unwrap();
    let right = tempdir().unwrap();
    let l = write_file(left.path(), "data.bin", &[3u8; 2048]);
    let r = write_file(right.path(), "data.bin", &[3u8; 2048]);

    let (groups, _) = DuplicateFinder::with_defaults()
        .find_duplicates(&[left.path().to_path_buf(), right.path().to_path_buf()])
        .unwrap();
    let report = DedupExecutor::new(CopyBackend, ReplaceConfig::default()).execute(groups);

    assert_eq!(report.cloned, 1);
    assert_eq!(report.bytes_reclaimed, 2048);
    assert_eq!(fs::read(&l).unwrap(), vec![3u8; 2048]);
    assert_eq!(fs::read(&r).unwrap(), vec![3u8; 2048]);
}
