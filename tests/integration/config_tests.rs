use clap::Parser;
use cowdupe::cli::Cli;
use cowdupe::config::{Config, ConfigError};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use std::fs;
use tempfile::tempdir;

#[test]
fn test_config_load_defaults() {
    // Use figment directly without Env to avoid interference from other tests
    let figment = Figment::from(Serialized::defaults(Config::default()));
    let config: Config = figment.extract().unwrap();
    assert_eq!(config, Config::default());
    assert_eq!(config.chunk_size, 100_000_000);
}

#[test]
fn test_config_load_from_toml() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(
        &config_path,
        r#"
io_threads = 3
chunk_size = 4096
paranoid = true
skip_hidden = true
min_size = 10
ignore_patterns = ["*.part", "cache/"]
"#,
    )
    .unwrap();

    let figment =
        Figment::from(Serialized::defaults(Config::default())).merge(Toml::file(&config_path));
    let config: Config = figment.extract().unwrap();

    assert_eq!(config.io_threads, 3);
    assert_eq!(config.chunk_size, 4096);
    assert!(config.paranoid);
    assert!(config.skip_hidden);
    assert!(!config.dry_run);
    assert_eq!(config.min_size, Some(10));
    assert_eq!(config.max_size, None);
    assert_eq!(config.ignore_patterns, ["*.part", "cache/"]);
}

#[test]
fn test_config_load_explicit_file() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("cowdupe.toml");
    fs::write(&config_path, "strict_attributes = true\nmax_size = 1000000\n").unwrap();

    let config = Config::load(Some(config_path.as_path())).unwrap();
    assert!(config.strict_attributes);
    assert_eq!(config.max_size, Some(1_000_000));
}

#[test]
fn test_config_load_from_env() {
    std::env::set_var("COWDUPE_TEST_IO_THREADS", "16");
    std::env::set_var("COWDUPE_TEST_CHUNK_SIZE", "65536");

    // A dedicated prefix keeps this test from leaking into other tests
    let figment = Figment::from(Serialized::defaults(Config::default()))
        .merge(Env::prefixed("COWDUPE_TEST_").split("__"));
    let config: Config = figment.extract().unwrap();

    assert_eq!(config.io_threads, 16);
    assert_eq!(config.chunk_size, 65536);

    std::env::remove_var("COWDUPE_TEST_IO_THREADS");
    std::env::remove_var("COWDUPE_TEST_CHUNK_SIZE");
}

#[test]
fn test_config_env_overrides_file() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "io_threads = 2\nparanoid = true\n").unwrap();

    std::env::set_var("COWDUPE_LAYER_IO_THREADS", "9");
    let figment = Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(&config_path))
        .merge(Env::prefixed("COWDUPE_LAYER_").split("__"));
    let config: Config = figment.extract().unwrap();
    std::env::remove_var("COWDUPE_LAYER_IO_THREADS");

    assert_eq!(config.io_threads, 9);
    assert!(config.paranoid);
}

#[test]
fn test_config_invalid_toml() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "io_threads = \"many\"\n").unwrap();

    let result = Config::load(Some(config_path.as_path()));
    assert!(matches!(result, Err(ConfigError::Figment(_))));
}

#[test]
fn test_config_cli_overrides_file() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "io_threads = 2\nmin_size = 100\n").unwrap();

    let cli = Cli::try_parse_from([
        "cowdupe",
        "--config",
        config_path.to_str().unwrap(),
        "--io-threads",
        "5",
        "--dry-run",
        "/data",
    ])
    .unwrap();

    let mut config = Config::load(cli.config.as_deref()).unwrap();
    config.apply_cli(&cli).unwrap();
    config.validate().unwrap();

    assert_eq!(config.io_threads, 5);
    assert_eq!(config.min_size, Some(100));
    assert!(config.dry_run);
}

#[test]
fn test_config_missing_explicit_file() {
    let temp_dir = tempdir().unwrap();
    let result = Config::load(Some(temp_dir.path().join("absent.toml").as_path()));
    assert!(matches!(result, Err(ConfigError::MissingFile(_))));
}
