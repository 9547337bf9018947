//! Layered application configuration.
//!
//! Settings are merged from, lowest priority first:
//!
//! 1. Built-in defaults
//! 2. TOML file: `--config FILE`, or `cowdupe/config.toml` in the platform
//!    config directory (`~/.config` on Linux, `~/Library/Application Support`
//!    on macOS)
//! 3. Environment variables prefixed `COWDUPE_` (`COWDUPE_IO_THREADS=4`)
//! 4. Command-line flags
//!
//! ```toml
//! io_threads = 4
//! chunk_size = 67108864
//! paranoid = true
//! skip_hidden = true
//! min_size = 4096
//! ignore_patterns = ["*.part", "node_modules/"]
//! ```

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::actions::ReplaceConfig;
use crate::cli::Cli;
use crate::duplicates::FinderConfig;
use crate::scanner::{WalkerConfig, DEFAULT_CHUNK_SIZE};

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "COWDUPE_";

/// Errors loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An explicitly requested config file does not exist.
    #[error("config file not found: {0}")]
    MissingFile(PathBuf),

    /// A layer could not be parsed or had the wrong types.
    #[error("invalid configuration: {0}")]
    Figment(#[from] Box<figment::Error>),

    /// Values parsed but are inconsistent.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Effective settings for a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Hashing threads; 0 uses the host's available parallelism.
    pub io_threads: usize,
    /// Bytes read per hashing call.
    pub chunk_size: usize,
    /// Byte-compare files before replacing.
    pub paranoid: bool,
    /// Keep originals whose attributes cannot be fully restored.
    pub strict_attributes: bool,
    /// Report without modifying anything.
    pub dry_run: bool,
    /// Skip dot-files and dot-directories.
    pub skip_hidden: bool,
    /// Ignore files smaller than this.
    pub min_size: Option<u64>,
    /// Ignore files larger than this.
    pub max_size: Option<u64>,
    /// Gitignore-style patterns to skip.
    pub ignore_patterns: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            io_threads: 0,
            chunk_size: DEFAULT_CHUNK_SIZE,
            paranoid: false,
            strict_attributes: false,
            dry_run: false,
            skip_hidden: false,
            min_size: None,
            max_size: None,
            ignore_patterns: Vec::new(),
        }
    }
}

impl Config {
    /// Platform default config file location.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("io", "cowdupe", "cowdupe").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Defaults, file and environment layers, without CLI overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingFile`] if `explicit` is given but does
    /// not exist. A missing default file is not an error.
    pub fn figment(explicit: Option<&Path>) -> Result<Figment, ConfigError> {
        let file = match explicit {
            Some(path) if !path.exists() => {
                return Err(ConfigError::MissingFile(path.to_path_buf()))
            }
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_path(),
        };

        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(file) = file {
            log::debug!("Config file: {}", file.display());
            figment = figment.merge(Toml::file(file));
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Load the file and environment layers.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a layer is missing or malformed.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        Self::figment(explicit)?
            .extract()
            .map_err(|e| ConfigError::Figment(Box::new(e)))
    }

    /// Apply command-line flags on top of the loaded layers.
    ///
    /// Boolean flags can only switch a setting on. Ignore patterns from the
    /// command line are appended to the configured ones.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `--chunk-size` does not fit in
    /// memory addressing on this platform.
    pub fn apply_cli(&mut self, cli: &Cli) -> Result<(), ConfigError> {
        if let Some(threads) = cli.io_threads {
            self.io_threads = threads;
        }
        if let Some(chunk) = cli.chunk_size {
            self.chunk_size = usize::try_from(chunk)
                .map_err(|_| ConfigError::Invalid(format!("chunk size {chunk} is too large")))?;
        }
        if cli.min_size.is_some() {
            self.min_size = cli.min_size;
        }
        if cli.max_size.is_some() {
            self.max_size = cli.max_size;
        }
        self.paranoid |= cli.paranoid;
        self.strict_attributes |= cli.strict_attributes;
        self.dry_run |= cli.dry_run;
        self.skip_hidden |= cli.skip_hidden;
        self.ignore_patterns
            .extend(cli.ignore_patterns.iter().cloned());
        Ok(())
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a zero chunk size or a minimum
    /// size above the maximum.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk_size must be positive".into()));
        }
        if let (Some(min), Some(max)) = (self.min_size, self.max_size) {
            if min > max {
                return Err(ConfigError::Invalid(format!(
                    "min_size ({min}) is larger than max_size ({max})"
                )));
            }
        }
        Ok(())
    }

    /// Walker options derived from this configuration.
    #[must_use]
    pub fn walker_config(&self) -> WalkerConfig {
        WalkerConfig {
            skip_hidden: self.skip_hidden,
            min_size: self.min_size,
            max_size: self.max_size,
            ignore_patterns: self.ignore_patterns.clone(),
        }
    }

    /// Finder options derived from this configuration.
    #[must_use]
    pub fn finder_config(&self) -> FinderConfig {
        FinderConfig::default()
            .with_io_threads(self.io_threads)
            .with_chunk_size(self.chunk_size)
            .with_walker_config(self.walker_config())
    }

    /// Executor options derived from this configuration.
    #[must_use]
    pub fn replace_config(&self) -> ReplaceConfig {
        ReplaceConfig::default()
            .with_paranoid(self.paranoid)
            .with_strict_attributes(self.strict_attributes)
            .with_dry_run(self.dry_run)
    }
}
