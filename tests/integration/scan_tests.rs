use crate::common::write_file;
use cowdupe::duplicates::{DuplicateFinder, FinderConfig, FinderError};
use cowdupe::scanner::WalkerConfig;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tempfile::tempdir;

#[test]
fn test_scan_empty_directory() {
    let dir = tempdir().unwrap();
    let finder = DuplicateFinder::with_defaults();

    let (groups, summary) = finder.find_duplicates(&[dir.path().to_path_buf()]).unwrap();

    assert!(groups.is_empty());
    assert_eq!(summary.total_files, 0);
    assert_eq!(summary.duplicate_groups, 0);
}

#[test]
fn test_scan_unique_sizes_are_never_hashed() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "a.txt", b"a");
    write_file(dir.path(), "b.txt", b"bb");
    write_file(dir.path(), "c.txt", b"ccc");

    let finder = DuplicateFinder::with_defaults();
    let (groups, summary) = finder.find_duplicates(&[dir.path().to_path_buf()]).unwrap();

    assert!(groups.is_empty());
    assert_eq!(summary.total_files, 3);
    assert_eq!(summary.eliminated_by_size, 3);
    assert_eq!(summary.candidate_files, 0);
    assert_eq!(summary.hashed_files, 0);
}

#[test]
fn test_scan_same_size_different_content() {
    let dir = tempdir().unwrap();
    let a = write_file(dir.path(), "a", b"0123456789");
    let b = write_file(dir.path(), "b", b"0123456789");
    let c = write_file(dir.path(), "c", b"abcdefghij");

    let finder = DuplicateFinder::with_defaults();
    let (groups, summary) = finder.find_duplicates(&[dir.path().to_path_buf()]).unwrap();

    assert_eq!(summary.candidate_files, 3);
    assert_eq!(summary.hashed_files, 3);
    assert_eq!(summary.unique_digests, 2);
    assert_eq!(groups.len(), 1);

    let group = &groups[0];
    assert_eq!(group.size, 10);
    assert_eq!(group.len(), 2);
    assert_eq!(group.reclaimable(), 10);

    let mut paths: Vec<_> = group.files().iter().map(|f| f.path.clone()).collect();
    paths.sort();
    assert_eq!(
        paths,
        [a.canonicalize().unwrap(), b.canonicalize().unwrap()]
    );
    assert!(group.files().iter().all(|f| f.path != c.canonicalize().unwrap()));
}

#[test]
fn test_scan_nested_directories() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "top.bin", b"payload");
    write_file(dir.path(), "one/two/deep.bin", b"payload");
    write_file(dir.path(), "one/other.bin", b"different");

    let finder = DuplicateFinder::with_defaults();
    let (groups, summary) = finder.find_duplicates(&[dir.path().to_path_buf()]).unwrap();

    assert_eq!(summary.total_files, 3);
    assert_eq!(groups.len(), 1);
    assert_eq!(summary.duplicate_files, 1);
}

#[test]
fn test_scan_groups_ordered_largest_first() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "s1", b"xy");
    write_file(dir.path(), "s2", b"xy");
    write_file(dir.path(), "l1", &[7u8; 4096]);
    write_file(dir.path(), "l2", &[7u8; 4096]);

    let finder = DuplicateFinder::with_defaults();
    let (groups, _) = finder.find_duplicates(&[dir.path().to_path_buf()]).unwrap();

    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].size, 4096);
    assert_eq!(groups[1].size, 2);
}

#[test]
fn test_scan_empty_files_form_a_group() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "empty1", b"");
    write_file(dir.path(), "empty2", b"");

    let finder = DuplicateFinder::with_defaults();
    let (groups, summary) = finder.find_duplicates(&[dir.path().to_path_buf()]).unwrap();

    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].size, 0);
    assert_eq!(summary.reclaimable_space, 0);
}

#[test]
fn test_scan_respects_walker_filters() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "keep1.dat", b"same content");
    write_file(dir.path(), "keep2.dat", b"same content");
    write_file(dir.path(), "skip.tmp", b"same content");
    write_file(dir.path(), "tiny1", b"x");
    write_file(dir.path(), "tiny2", b"x");

    let config = FinderConfig::default().with_walker_config(WalkerConfig {
        min_size: Some(2),
        ignore_patterns: vec!["*.tmp".to_string()],
        ..Default::default()
    });
    let finder = DuplicateFinder::new(config);
    let (groups, summary) = finder.find_duplicates(&[dir.path().to_path_buf()]).unwrap();

    assert_eq!(summary.total_files, 2);
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].len(), 2);
}

#[test]
fn test_scan_with_single_thread_and_tiny_chunks() {
    let dir = tempdir().unwrap();
    let content: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
    write_file(dir.path(), "a", &content);
    write_file(dir.path(), "b", &content);

    let config = FinderConfig::default().with_io_threads(1).with_chunk_size(7);
    let finder = DuplicateFinder::new(config);
    let (groups, summary) = finder.find_duplicates(&[dir.path().to_path_buf()]).unwrap();

    assert_eq!(groups.len(), 1);
    assert_eq!(summary.hashed_files, 2);
}

#[test]
fn test_scan_nonexistent_root() {
    let finder = DuplicateFinder::with_defaults();
    let result = finder.find_duplicates(&[PathBuf::from("/nonexistent/cowdupe/root")]);
    assert!(matches!(result, Err(FinderError::PathNotFound(_))));
}

#[test]
fn test_scan_file_as_root() {
    let dir = tempdir().unwrap();
    let file = write_file(dir.path(), "plain", b"data");

    let finder = DuplicateFinder::with_defaults();
    let result = finder.find_duplicates(&[file]);
    assert!(matches!(result, Err(FinderError::NotADirectory(_))));
}

#[test]
fn test_scan_shutdown_requested_returns_interrupted() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "a", b"dup");
    write_file(dir.path(), "b", b"dup");

    let flag = Arc::new(AtomicBool::new(true));
    let finder = DuplicateFinder::new(FinderConfig::default().with_shutdown_flag(flag));
    let result = finder.find_duplicates(&[dir.path().to_path_buf()]);

    assert!(matches!(result, Err(FinderError::Interrupted)));
}
