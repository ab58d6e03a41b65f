//! Application configuration management.
//!
//! Settings are merged in increasing priority:
//!
//! 1. Built-in defaults
//! 2. TOML config file (`--config PATH`, else `hffs/config.toml` in the
//!    platform config directory, if it exists)
//! 3. Environment variables prefixed `HFFS_` (e.g. `HFFS_MATCH_POLICY=none`)
//! 4. Command-line flags
//!
//! # Example
//!
//! ```toml
//! match_policy = "fullPath"
//! chunk_size = 8388608
//! attr_ttl_secs = 5
//! allow_other = true
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::cli::Cli;
use crate::error::ConfigError;
use crate::matcher::MatchPolicy;
use crate::scanner::DEFAULT_CHUNK_SIZE;

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "HFFS_";

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How paths are compared after a hash hit.
    pub match_policy: MatchPolicy,
    /// Bytes read per hashing step.
    pub chunk_size: usize,
    /// Seconds the kernel may cache attributes and lookups.
    pub attr_ttl_secs: u64,
    /// Let users other than the mounting user access the mount.
    pub allow_other: bool,
    /// Unmount automatically when the process exits.
    pub auto_unmount: bool,
    /// Filesystem name reported to the kernel (visible in `mount` output).
    pub fs_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            match_policy: MatchPolicy::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            attr_ttl_secs: 1,
            allow_other: false,
            auto_unmount: false,
            fs_name: "hffs".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from defaults, a config file and the environment.
    ///
    /// An explicit `config_path` must exist; the platform default is optional.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] if the file is missing (explicit path only),
    /// unparsable, or holds values of the wrong type.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            if !path.is_file() {
                return Err(ConfigError::Invalid(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
        }

        let file = config_path.map(Path::to_path_buf).or_else(Self::default_path);
        let config: Self = Self::figment(file.as_deref())
            .extract()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        log::debug!("Loaded configuration: {:?}", config);
        Ok(config)
    }

    /// The layered provider stack used by [`Config::load`].
    #[must_use]
    pub fn figment(config_path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    /// Platform-specific default config file location.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "hffs", "hffs").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Apply explicit command-line flags on top of the loaded values.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(policy) = cli.match_policy {
            self.match_policy = policy;
        }
        if cli.allow_other {
            self.allow_other = true;
        }
        if cli.auto_unmount {
            self.auto_unmount = true;
        }
    }

    /// Reject values that cannot work.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] for a zero chunk size or an empty fs name.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk_size must be greater than 0".into()));
        }
        if self.fs_name.trim().is_empty() {
            return Err(ConfigError::Invalid("fs_name must not be empty".into()));
        }
        Ok(())
    }

    /// Kernel attribute/entry cache lifetime.
    #[must_use]
    pub fn attr_ttl(&self) -> Duration {
        Duration::from_secs(self.attr_ttl_secs)
    }
}
