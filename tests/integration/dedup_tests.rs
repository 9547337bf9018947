use crate::common::{temp_leftovers, write_file, CopyBackend};
use cowdupe::actions::{DedupExecutor, ReplaceConfig, ReplaceError};
use cowdupe::duplicates::{DedupGroup, DuplicateFinder};
use filetime::FileTime;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn scan(dir: &Path) -> Vec<DedupGroup> {
    let (groups, _) = DuplicateFinder::with_defaults()
        .find_duplicates(&[dir.to_path_buf()])
        .unwrap();
    groups
}

#[test]
fn test_dedup_two_identical_one_different() {
    let dir = tempdir().unwrap();
    let a = write_file(dir.path(), "a", b"0123456789");
    let b = write_file(dir.path(), "b", b"0123456789");
    let c = write_file(dir.path(), "c", b"abcdefghij");

    let executor = DedupExecutor::new(CopyBackend, ReplaceConfig::default());
    let report = executor.execute(scan(dir.path()));

    assert_eq!(report.cloned, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.bytes_reclaimed, 10);
    assert_eq!(report.reclaimed_megabytes(), 0);
    assert_eq!(fs::read(&a).unwrap(), b"0123456789");
    assert_eq!(fs::read(&b).unwrap(), b"0123456789");
    assert_eq!(fs::read(&c).unwrap(), b"abcdefghij");
    assert!(temp_leftovers(dir.path()).is_empty());
}

#[test]
fn test_dedup_savings_in_megabytes() {
    let dir = tempdir().unwrap();
    let content = vec![0x5au8; 3_000_000];
    for name in ["one", "two", "three", "four", "five"] {
        write_file(dir.path(), name, &content);
    }

    let executor = DedupExecutor::new(CopyBackend, ReplaceConfig::default());
    let report = executor.execute(scan(dir.path()));

    assert_eq!(report.cloned, 4);
    assert_eq!(report.bytes_reclaimed, 12_000_000);
    assert_eq!(report.reclaimed_megabytes(), 12);
    assert_eq!(report.groups.len(), 1);
    assert_eq!(report.groups[0].records.len(), 4);
}

#[test]
fn test_dedup_each_file_keeps_its_own_times() {
    let dir = tempdir().unwrap();
    let a = write_file(dir.path(), "a", b"shared bytes");
    let b = write_file(dir.path(), "b", b"shared bytes");

    let a_time = FileTime::from_unix_time(1_000_000_000, 0);
    let b_time = FileTime::from_unix_time(1_200_000_000, 0);
    filetime::set_file_mtime(&a, a_time).unwrap();
    filetime::set_file_mtime(&b, b_time).unwrap();

    let executor = DedupExecutor::new(CopyBackend, ReplaceConfig::default());
    let report = executor.execute(scan(dir.path()));
    assert_eq!(report.cloned, 1);

    let a_after = FileTime::from_last_modification_time(&fs::metadata(&a).unwrap());
    let b_after = FileTime::from_last_modification_time(&fs::metadata(&b).unwrap());
    assert_eq!(a_after, a_time);
    assert_eq!(b_after, b_time);
}

#[cfg(unix)]
#[test]
fn test_dedup_each_file_keeps_its_own_mode() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir().unwrap();
    let a = write_file(dir.path(), "a", b"mode test");
    let b = write_file(dir.path(), "b", b"mode test");
    fs::set_permissions(&a, fs::Permissions::from_mode(0o640)).unwrap();
    fs::set_permissions(&b, fs::Permissions::from_mode(0o604)).unwrap();

    let executor = DedupExecutor::new(CopyBackend, ReplaceConfig::default());
    let report = executor.execute(scan(dir.path()));
    assert_eq!(report.cloned, 1);

    assert_eq!(fs::metadata(&a).unwrap().permissions().mode() & 0o777, 0o640);
    assert_eq!(fs::metadata(&b).unwrap().permissions().mode() & 0o777, 0o604);
}

#[cfg(unix)]
#[test]
fn test_dedup_master_is_never_replaced() {
    use std::os::unix::fs::MetadataExt;

    let dir = tempdir().unwrap();
    write_file(dir.path(), "a", b"master check");
    write_file(dir.path(), "b", b"master check");
    write_file(dir.path(), "c", b"master check");

    let groups = scan(dir.path());
    let master = groups[0].master().path.clone();
    let dups: Vec<_> = groups[0].duplicates().iter().map(|f| f.path.clone()).collect();
    let master_ino = fs::metadata(&master).unwrap().ino();
    let dup_inos: Vec<_> = dups.iter().map(|p| fs::metadata(p).unwrap().ino()).collect();

    let executor = DedupExecutor::new(CopyBackend, ReplaceConfig::default());
    let report = executor.execute(groups);
    assert_eq!(report.cloned, 2);

    assert_eq!(fs::metadata(&master).unwrap().ino(), master_ino);
    for (path, before) in dups.iter().zip(dup_inos) {
        assert_ne!(fs::metadata(path).unwrap().ino(), before);
        assert_eq!(fs::read(path).unwrap(), b"master check");
    }
}

#[cfg(unix)]
#[test]
fn test_dedup_dry_run_changes_nothing() {
    use std::os::unix::fs::MetadataExt;

    let dir = tempdir().unwrap();
    let a = write_file(dir.path(), "a", b"dry run");
    let b = write_file(dir.path(), "b", b"dry run");
    let inodes = [
        fs::metadata(&a).unwrap().ino(),
        fs::metadata(&b).unwrap().ino(),
    ];

    let executor = DedupExecutor::new(CopyBackend, ReplaceConfig::default().with_dry_run(true));
    let report = executor.execute(scan(dir.path()));

    assert!(report.dry_run);
    assert_eq!(report.cloned, 0);
    assert_eq!(report.bytes_reclaimed, 0);
    assert_eq!(report.would_reclaim, 7);
    assert_eq!(fs::metadata(&a).unwrap().ino(), inodes[0]);
    assert_eq!(fs::metadata(&b).unwrap().ino(), inodes[1]);
}

#[test]
fn test_dedup_skips_file_changed_after_scan() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "a", b"original");
    write_file(dir.path(), "b", b"original");

    let groups = scan(dir.path());
    let dup = groups[0].duplicates()[0].path.clone();
    fs::write(&dup, b"rewritten with more bytes").unwrap();

    let executor = DedupExecutor::new(CopyBackend, ReplaceConfig::default());
    let report = executor.execute(groups);

    assert_eq!(report.cloned, 0);
    assert_eq!(report.skipped, 1);
    assert!(matches!(
        report.groups[0].records[0].result,
        Err(ReplaceError::Modified(_))
    ));
    assert_eq!(fs::read(&dup).unwrap(), b"rewritten with more bytes");
}

#[test]
fn test_dedup_paranoid_mode_clones_identical_files() {
    let dir = tempdir().unwrap();
    let content: Vec<u8> = (0..200_000u32).map(|i| (i * 7 % 256) as u8).collect();
    write_file(dir.path(), "a", &content);
    write_file(dir.path(), "b", &content);

    let executor = DedupExecutor::new(CopyBackend, ReplaceConfig::default().with_paranoid(true));
    let report = executor.execute(scan(dir.path()));

    assert_eq!(report.cloned, 1);
    assert_eq!(report.bytes_reclaimed, 200_000);
}

#[test]
fn test_dedup_native_backend_never_loses_data() {
    let dir = tempdir().unwrap();
    let a = write_file(dir.path(), "a", b"native backend");
    let b = write_file(dir.path(), "b", b"native backend");

    // Clones fail on filesystems without reflink support; either way both
    // files must still hold their content.
    let executor = DedupExecutor::native(ReplaceConfig::default());
    let report = executor.execute(scan(dir.path()));

    assert_eq!(report.cloned + report.already_shared + report.failed, 1);
    if report.cloned == 1 {
        assert_eq!(report.bytes_reclaimed, 14);
    }
    assert_eq!(fs::read(&a).unwrap(), b"native backend");
    assert_eq!(fs::read(&b).unwrap(), b"native backend");
    assert!(temp_leftovers(dir.path()).is_empty());
}

#[cfg(unix)]
#[test]
fn test_second_run_is_idempotent() {
    use crate::common::TrackingBackend;

    let dir = tempdir().unwrap();
    for name in ["a", "b", "c", "d"] {
        write_file(dir.path(), name, b"four copies of this");
    }
    write_file(dir.path(), "sub/x", b"pair");
    write_file(dir.path(), "sub/y", b"pair");
    write_file(dir.path(), "unique", b"only one of these");

    let backend = TrackingBackend::default();

    let first = DedupExecutor::new(backend.clone(), ReplaceConfig::default())
        .execute(scan(dir.path()));
    assert_eq!(first.cloned, 4);
    assert_eq!(first.already_shared, 0);
    assert_eq!(first.bytes_reclaimed, 3 * 19 + 4);
    assert_eq!(backend.clones().len(), 4);

    let second = DedupExecutor::new(backend.clone(), ReplaceConfig::default())
        .execute(scan(dir.path()));
    assert_eq!(second.cloned, 0);
    assert_eq!(second.bytes_reclaimed, 0);
    assert_eq!(second.reclaimed_megabytes(), 0);
    assert_eq!(second.already_shared, 4);
    assert_eq!(second.failed + second.skipped, 0);
    assert_eq!(backend.clones().len(), 4);

    for name in ["a", "b", "c", "d"] {
        assert_eq!(fs::read(dir.path().join(name)).unwrap(), b"four copies of this");
    }
    assert!(temp_leftovers(dir.path()).is_empty());
}

#[cfg(unix)]
#[test]
fn test_hardlinked_duplicate_is_left_linked() {
    use std::os::unix::fs::MetadataExt;

    let dir = tempdir().unwrap();
    let outside = tempdir().unwrap();
    write_file(dir.path(), "a", b"linked content");
    let b = write_file(dir.path(), "b", b"linked content");
    let b_link = outside.path().join("b_link");
    fs::hard_link(&b, &b_link).unwrap();
    let inode = fs::metadata(&b).unwrap().ino();

    let groups = scan(dir.path());
    assert_eq!(groups.len(), 1);
    // Put the unlinked file first so the linked one is the duplicate.
    let mut files = groups[0].files().to_vec();
    files.sort_by_key(|f| f.path.file_name() != Some(std::ffi::OsStr::new("a")));
    let group = DedupGroup::new(groups[0].digest, files).unwrap();

    let report = DedupExecutor::new(CopyBackend, ReplaceConfig::default()).execute(vec![group]);

    assert_eq!(report.cloned, 0);
    assert_eq!(report.bytes_reclaimed, 0);
    assert_eq!(report.skipped, 1);
    assert!(matches!(
        report.groups[0].records[0].result,
        Err(ReplaceError::Hardlinked { .. })
    ));
    assert_eq!(fs::metadata(&b).unwrap().ino(), inode);
    assert_eq!(fs::metadata(&b_link).unwrap().ino(), inode);
    assert_eq!(fs::metadata(&b).unwrap().nlink(), 2);
}
