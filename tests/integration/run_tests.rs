use crate::common::write_file;
use clap::Parser;
use cowdupe::cli::Cli;
use cowdupe::error::ExitCode;
use std::fs;
use tempfile::tempdir;

fn run(args: &[&str]) -> anyhow::Result<ExitCode> {
    let mut argv = vec!["cowdupe", "--quiet", "--no-progress"];
    argv.extend_from_slice(args);
    cowdupe::run_app(Cli::try_parse_from(argv).unwrap())
}

#[test]
fn test_run_no_duplicates() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "unique.txt", b"unique");

    let code = run(&["--output", "json", dir.path().to_str().unwrap()]).unwrap();
    assert_eq!(code, ExitCode::NoDuplicates);
}

#[test]
fn test_run_dry_run_with_duplicates() {
    let dir = tempdir().unwrap();
    let a = write_file(dir.path(), "a.txt", b"dup");
    let b = write_file(dir.path(), "b.txt", b"dup");

    let code = run(&["--dry-run", dir.path().to_str().unwrap()]).unwrap();
    assert_eq!(code, ExitCode::Success);
    assert_eq!(fs::read(a).unwrap(), b"dup");
    assert_eq!(fs::read(b).unwrap(), b"dup");
}

#[test]
fn test_run_replaces_or_reports_partial() {
    let dir = tempdir().unwrap();
    let a = write_file(dir.path(), "a.bin", b"replace me");
    let b = write_file(dir.path(), "b.bin", b"replace me");

    // Without reflink support the clone fails and the run is partial.
    let code = run(&["--paranoid", dir.path().to_str().unwrap()]).unwrap();
    assert!(matches!(code, ExitCode::Success | ExitCode::PartialSuccess));
    assert_eq!(fs::read(a).unwrap(), b"replace me");
    assert_eq!(fs::read(b).unwrap(), b"replace me");
}

#[test]
fn test_run_nonexistent_path_is_error() {
    let err = run(&["/nonexistent/cowdupe/path"]).unwrap_err();
    assert_eq!(ExitCode::for_error(&err), ExitCode::GeneralError);
    assert!(format!("{err:#}").contains("Path not found"));
}

#[test]
fn test_run_missing_config_file_is_error() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("missing.toml");
    let err = run(&[
        "--config",
        missing.to_str().unwrap(),
        dir.path().to_str().unwrap(),
    ])
    .unwrap_err();
    assert!(format!("{err:#}").contains("config file not found"));
}

#[test]
fn test_run_rejects_inverted_size_range() {
    let dir = tempdir().unwrap();
    let err = run(&[
        "--min-size",
        "10KB",
        "--max-size",
        "1KB",
        dir.path().to_str().unwrap(),
    ])
    .unwrap_err();
    assert!(format!("{err:#}").contains("min_size"));
}
