//! core::config
//!
//! Configuration schema and loading.
//!
//! # Overview
//!
//! svnbridge has two configuration scopes:
//! - **Global**: User-level settings (cache location, default mapping)
//! - **Repo**: Per source repository settings, keyed by repository UUID
//!
//! # Precedence
//!
//! Configuration values are resolved in this order (later overrides earlier):
//! 1. Default values
//! 2. Global config file
//! 3. Repo config file
//! 4. CLI flags (not handled here)
//!
//! # Global Config Locations
//!
//! Searched in order:
//! 1. `$SVNBRIDGE_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/svnbridge/config.toml`
//! 3. `~/.svnbridge/config.toml` (canonical write location)
//!
//! # Repo Config Location
//!
//! `<cache_root>/<uuid>/config.toml`, routed through
//! [`BridgePaths`](crate::core::paths::BridgePaths).
//!
//! # Example
//!
//! ```no_run
//! use svnbridge::core::config::Config;
//! use svnbridge::core::types::RepositoryUuid;
//!
//! let uuid = RepositoryUuid::new("6e7a5c1a-1f2b-4c3d-9e8f-0a1b2c3d4e5f").unwrap();
//! let result = Config::load(Some(&uuid)).unwrap();
//! let config = result.config;
//!
//! println!("Append-only: {}", config.append_revisions_only());
//! println!("Mapping: {}", config.default_mapping());
//! ```

pub mod schema;

pub use schema::{CacheSettings, GlobalConfig, RepoConfig};

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::paths::BridgePaths;
use crate::core::types::RepositoryUuid;

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("failed to write config file '{path}': {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config value: {0}")]
    InvalidValue(String),

    #[error("home directory not found")]
    NoHomeDir,

    #[error("no cache directory available; set cache_dir")]
    NoCacheDir,
}

/// Warnings generated during config loading.
#[derive(Debug, Clone)]
pub struct ConfigWarning {
    /// The warning message.
    pub message: String,
    /// The path that triggered the warning.
    pub path: PathBuf,
}

/// Result of loading configuration.
#[derive(Debug)]
pub struct ConfigLoadResult {
    /// The loaded configuration.
    pub config: Config,
    /// Any warnings generated during loading.
    pub warnings: Vec<ConfigWarning>,
}

/// Merged configuration from all sources.
///
/// Accessors apply precedence rules and defaults.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Global configuration
    pub global: GlobalConfig,
    /// Repository configuration (if a repository was named)
    pub repo: Option<RepoConfig>,
    global_path: Option<PathBuf>,
    repo_path: Option<PathBuf>,
}

impl Config {
    /// Default number of revisions per flushed cache transaction.
    pub const DEFAULT_FLUSH_EVERY: u64 = 1000;

    /// Default number of revisions requested per log round trip.
    pub const DEFAULT_LOG_BATCH_SIZE: u64 = 1000;

    /// Load configuration from default locations.
    ///
    /// If `uuid` is provided, also loads that repository's config.
    ///
    /// # Errors
    ///
    /// Returns an error if config files exist but cannot be parsed.
    /// Missing config files are not an error (defaults are used).
    pub fn load(uuid: Option<&RepositoryUuid>) -> Result<ConfigLoadResult, ConfigError> {
        let global_path = Self::find_global()?;
        let global = match &global_path {
            Some(path) => Self::read_toml::<GlobalConfig>(path)?,
            None => GlobalConfig::default(),
        };

        let repo_path = match uuid {
            Some(uuid) => {
                let root = match &global.cache_dir {
                    Some(dir) => dir.clone(),
                    None => BridgePaths::default_root().ok_or(ConfigError::NoCacheDir)?,
                };
                Some(BridgePaths::new(root).repo_config_path(uuid))
            }
            None => None,
        };

        Self::assemble(global, global_path, repo_path.as_deref())
    }

    /// Load configuration from explicit file paths.
    ///
    /// Missing files fall back to defaults, exactly like [`Config::load`].
    pub fn load_from(
        global_path: Option<&Path>,
        repo_path: Option<&Path>,
    ) -> Result<ConfigLoadResult, ConfigError> {
        let (global, global_found) = match global_path {
            Some(path) if path.exists() => (Self::read_toml(path)?, Some(path.to_path_buf())),
            _ => (GlobalConfig::default(), None),
        };
        Self::assemble(global, global_found, repo_path)
    }

    fn assemble(
        global: GlobalConfig,
        global_path: Option<PathBuf>,
        repo_path: Option<&Path>,
    ) -> Result<ConfigLoadResult, ConfigError> {
        let mut warnings = Vec::new();

        let (repo, repo_found) = match repo_path {
            Some(path) if path.exists() => {
                let config: RepoConfig = Self::read_toml(path)?;
                if config.layout.is_some() && (config.branches.is_some() || config.tags.is_some())
                {
                    warnings.push(ConfigWarning {
                        message: "both 'layout' and wildcard lists are set; \
                                  the wildcard lists take precedence"
                            .to_string(),
                        path: path.to_path_buf(),
                    });
                }
                (Some(config), Some(path.to_path_buf()))
            }
            _ => (None, None),
        };

        global.validate()?;
        if let Some(ref r) = repo {
            r.validate()?;
        }

        if global.default_mapping.as_deref() == Some("v3") {
            if let Some(path) = &global_path {
                warnings.push(ConfigWarning {
                    message: "mapping v3 stores metadata in file properties; \
                              v4 is recommended for new revisions"
                        .to_string(),
                    path: path.clone(),
                });
            }
        }

        Ok(ConfigLoadResult {
            config: Config {
                global,
                repo,
                global_path,
                repo_path: repo_found,
            },
            warnings,
        })
    }

    /// Find the global config file in standard locations.
    fn find_global() -> Result<Option<PathBuf>, ConfigError> {
        if let Ok(path) = std::env::var("SVNBRIDGE_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Ok(Some(path));
            }
        }

        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_home).join("svnbridge/config.toml");
            if path.exists() {
                return Ok(Some(path));
            }
        }

        if let Some(home) = dirs::home_dir() {
            let path = home.join(".svnbridge/config.toml");
            if path.exists() {
                return Ok(Some(path));
            }
        }

        Ok(None)
    }

    fn read_toml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Get the canonical path for global config.
    pub fn global_config_path() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(home.join(".svnbridge/config.toml"))
    }

    /// Write global config atomically.
    pub fn write_global(config: &GlobalConfig) -> Result<PathBuf, ConfigError> {
        let path = Self::global_config_path()?;
        Self::write_config_atomic(&path, config)?;
        Ok(path)
    }

    /// Write a repository config atomically.
    pub fn write_repo(
        paths: &BridgePaths,
        uuid: &RepositoryUuid,
        config: &RepoConfig,
    ) -> Result<PathBuf, ConfigError> {
        config.validate()?;
        let path = paths.repo_config_path(uuid);
        Self::write_config_atomic(&path, config)?;
        Ok(path)
    }

    /// Write a config file atomically (temp file, fsync, rename).
    fn write_config_atomic<T: serde::Serialize>(
        path: &Path,
        config: &T,
    ) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
                path: path.to_path_buf(),
                source: e,
            })?;
        }

        let contents =
            toml::to_string_pretty(config).map_err(|e| ConfigError::InvalidValue(e.to_string()))?;

        let temp_path = path.with_extension("toml.tmp");
        let mut file = fs::File::create(&temp_path).map_err(|e| ConfigError::WriteError {
            path: temp_path.clone(),
            source: e,
        })?;

        file.write_all(contents.as_bytes())
            .map_err(|e| ConfigError::WriteError {
                path: temp_path.clone(),
                source: e,
            })?;

        file.sync_all().map_err(|e| ConfigError::WriteError {
            path: temp_path.clone(),
            source: e,
        })?;

        fs::rename(&temp_path, path).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(())
    }

    // =========================================================================
    // Accessor methods with precedence
    // =========================================================================

    /// Storage routing for the configured cache root.
    pub fn paths(&self) -> Result<BridgePaths, ConfigError> {
        match &self.global.cache_dir {
            Some(dir) => Ok(BridgePaths::new(dir.clone())),
            None => BridgePaths::default_root()
                .map(BridgePaths::new)
                .ok_or(ConfigError::NoCacheDir),
        }
    }

    /// Mapping scheme used for new revisions.
    ///
    /// Defaults to "v4".
    pub fn default_mapping(&self) -> &str {
        self.global.default_mapping.as_deref().unwrap_or("v4")
    }

    /// Revisions requested per log round trip.
    pub fn log_batch_size(&self) -> u64 {
        self.global
            .log_batch_size
            .unwrap_or(Self::DEFAULT_LOG_BATCH_SIZE)
    }

    /// Whether the persistent history cache is enabled.
    ///
    /// Defaults to `true`.
    pub fn cache_enabled(&self) -> bool {
        self.global
            .cache
            .as_ref()
            .and_then(|c| c.enabled)
            .unwrap_or(true)
    }

    /// Revisions per flushed cache transaction.
    pub fn flush_every(&self) -> u64 {
        self.global
            .cache
            .as_ref()
            .and_then(|c| c.flush_every)
            .unwrap_or(Self::DEFAULT_FLUSH_EVERY)
    }

    /// Configured username, if any.
    pub fn username(&self) -> Option<&str> {
        self.global.username.as_deref()
    }

    /// Named layout, if configured.
    pub fn layout_name(&self) -> Option<&str> {
        self.repo.as_ref().and_then(|r| r.layout.as_deref())
    }

    /// Wildcard branch and tag lists, if either is configured.
    pub fn wildcard_lists(&self) -> Option<(Vec<String>, Vec<String>)> {
        let repo = self.repo.as_ref()?;
        if repo.branches.is_none() && repo.tags.is_none() {
            return None;
        }
        Some((
            repo.branches.clone().unwrap_or_default(),
            repo.tags.clone().unwrap_or_default(),
        ))
    }

    /// Whether pushes may replace branch history.
    ///
    /// Defaults to `true` (append-only).
    pub fn append_revisions_only(&self) -> bool {
        self.repo
            .as_ref()
            .and_then(|r| r.append_revisions_only)
            .unwrap_or(true)
    }

    /// Whether merged revisions are pushed along with the mainline.
    ///
    /// Defaults to `false`.
    pub fn push_merged_revisions(&self) -> bool {
        self.repo
            .as_ref()
            .and_then(|r| r.push_merged_revisions)
            .unwrap_or(false)
    }

    /// Native revision properties to overwrite after commit.
    pub fn override_svn_revprops(&self) -> &[String] {
        self.repo
            .as_ref()
            .and_then(|r| r.override_svn_revprops.as_deref())
            .unwrap_or(&[])
    }

    /// Whether one trailing newline is stripped from imported messages.
    pub fn log_strip_trailing_newline(&self) -> bool {
        self.repo
            .as_ref()
            .and_then(|r| r.log_strip_trailing_newline)
            .unwrap_or(false)
    }

    /// Get the path to the loaded global config file.
    pub fn global_config_loaded_from(&self) -> Option<&Path> {
        self.global_path.as_deref()
    }

    /// Get the path to the loaded repo config file.
    pub fn repo_config_loaded_from(&self) -> Option<&Path> {
        self.repo_path.as_deref()
    }
}
