//! core::config::schema
//!
//! Configuration schema types.
//!
//! # Global Config
//!
//! Located at (in order of precedence):
//! 1. `$SVNBRIDGE_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/svnbridge/config.toml`
//! 3. `~/.svnbridge/config.toml` (canonical write location)
//!
//! # Repo Config
//!
//! Located at `<cache_root>/<uuid>/config.toml`.
//!
//! # Validation
//!
//! Config values are validated after parsing (mapping names must be
//! writable schemes, layout names must be known, wildcard patterns must use
//! whole-segment wildcards).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Global configuration (user scope).
///
/// # Example
///
/// ```toml
/// cache_dir = "/var/cache/svnbridge"
/// default_mapping = "v4"
/// log_batch_size = 500
/// username = "alice"
///
/// [cache]
/// enabled = true
/// flush_every = 1000
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GlobalConfig {
    /// Root directory for per-repository state
    pub cache_dir: Option<PathBuf>,

    /// Mapping scheme used for new revisions
    pub default_mapping: Option<String>,

    /// Number of revisions requested per log round trip
    pub log_batch_size: Option<u64>,

    /// Username used when no credential provider supplies one
    pub username: Option<String>,

    /// History cache settings
    pub cache: Option<CacheSettings>,
}

impl GlobalConfig {
    /// Mapping schemes that may be used for new revisions.
    pub const WRITABLE_MAPPINGS: &'static [&'static str] = &["v3", "v4"];

    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(mapping) = &self.default_mapping {
            if !Self::WRITABLE_MAPPINGS.contains(&mapping.as_str()) {
                return Err(ConfigError::InvalidValue(format!(
                    "invalid default_mapping '{}', must be one of: {}",
                    mapping,
                    Self::WRITABLE_MAPPINGS.join(", ")
                )));
            }
        }

        if self.log_batch_size == Some(0) {
            return Err(ConfigError::InvalidValue(
                "log_batch_size must be positive".to_string(),
            ));
        }

        if let Some(cache) = &self.cache {
            cache.validate()?;
        }

        Ok(())
    }
}

/// History cache settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSettings {
    /// Persist changed paths in SQLite (otherwise query the server directly)
    pub enabled: Option<bool>,

    /// Revisions per flushed transaction
    pub flush_every: Option<u64>,
}

impl CacheSettings {
    /// Validate the cache settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.flush_every == Some(0) {
            return Err(ConfigError::InvalidValue(
                "cache.flush_every must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Repository configuration.
///
/// # Example
///
/// ```toml
/// layout = "trunk0"
/// append_revisions_only = true
/// override_svn_revprops = ["svn:author", "svn:date"]
///
/// # explicit wildcard lists replace the named layout
/// branches = ["branches/*", "people/*/work"]
/// tags = ["tags/*"]
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RepoConfig {
    /// Named branch layout (`root`, `trunk`, `trunkN`, `itrunkN`)
    pub layout: Option<String>,

    /// Wildcard branch patterns
    pub branches: Option<Vec<String>>,

    /// Wildcard tag patterns
    pub tags: Option<Vec<String>>,

    /// Refuse to replace branch history on push
    pub append_revisions_only: Option<bool>,

    /// Also push revisions merged into the pushed revision
    pub push_merged_revisions: Option<bool>,

    /// Native revision properties to overwrite after commit
    pub override_svn_revprops: Option<Vec<String>>,

    /// Strip one trailing newline from imported log messages
    pub log_strip_trailing_newline: Option<bool>,
}

impl RepoConfig {
    /// Revision properties that may be overridden after commit.
    pub const OVERRIDABLE_REVPROPS: &'static [&'static str] = &["svn:author", "svn:date"];

    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(layout) = &self.layout {
            if !crate::layout::is_known_layout_name(layout) {
                return Err(ConfigError::InvalidValue(format!(
                    "unknown layout '{layout}'"
                )));
            }
        }

        for pattern in self
            .branches
            .iter()
            .chain(self.tags.iter())
            .flatten()
        {
            validate_pattern(pattern)?;
        }

        if let Some(props) = &self.override_svn_revprops {
            for prop in props {
                if !Self::OVERRIDABLE_REVPROPS.contains(&prop.as_str()) {
                    return Err(ConfigError::InvalidValue(format!(
                        "cannot override revision property '{}', must be one of: {}",
                        prop,
                        Self::OVERRIDABLE_REVPROPS.join(", ")
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Check a wildcard branch/tag pattern.
fn validate_pattern(pattern: &str) -> Result<(), ConfigError> {
    let trimmed = pattern.trim_matches('/');
    if trimmed.is_empty() {
        return Err(ConfigError::InvalidValue(
            "branch pattern cannot be empty".to_string(),
        ));
    }
    for segment in trimmed.split('/') {
        if segment.is_empty() {
            return Err(ConfigError::InvalidValue(format!(
                "branch pattern '{pattern}' contains an empty segment"
            )));
        }
        if segment.contains('*') && segment != "*" {
            return Err(ConfigError::InvalidValue(format!(
                "branch pattern '{pattern}': '*' must be a whole segment"
            )));
        }
    }
    Ok(())
}
