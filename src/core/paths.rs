//! core::paths
//!
//! Centralized path routing for svnbridge storage locations.
//!
//! # Architecture
//!
//! All on-disk state lives under a single cache root and is partitioned by
//! source repository UUID. Two mirrors of the same repository reached via
//! different URLs share one cache, since changed-path records are a
//! property of the repository, not of the URL.
//!
//! **Hard rule:** no code outside this module computes storage paths.
//!
//! # Storage Layout
//!
//! ```text
//! <cache_root>/
//!   <uuid>/
//!     cache.db        history cache (SQLite)
//!     config.toml     per-repository configuration
//!     locks/
//!       <hash>.lock   per-branch write lock
//! ```
//!
//! # Example
//!
//! ```
//! use svnbridge::core::paths::BridgePaths;
//! use svnbridge::core::types::RepositoryUuid;
//! use std::path::PathBuf;
//!
//! let paths = BridgePaths::new(PathBuf::from("/var/cache/svnbridge"));
//! let uuid = RepositoryUuid::new("myuuid").unwrap();
//!
//! assert_eq!(
//!     paths.cache_db_path(&uuid),
//!     PathBuf::from("/var/cache/svnbridge/myuuid/cache.db")
//! );
//! ```

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::core::types::{BranchPath, RepositoryUuid};

/// Centralized path routing for svnbridge storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgePaths {
    /// Root of all cached state.
    pub cache_root: PathBuf,
}

impl BridgePaths {
    /// Create paths rooted at an explicit directory.
    pub fn new(cache_root: PathBuf) -> Self {
        Self { cache_root }
    }

    /// Default cache root: `<platform cache dir>/svnbridge`.
    ///
    /// Returns `None` when the platform has no cache directory.
    pub fn default_root() -> Option<PathBuf> {
        dirs::cache_dir().map(|d| d.join("svnbridge"))
    }

    // =========================================================================
    // Repository-scoped paths
    // =========================================================================

    /// Directory holding all state for one repository.
    pub fn repo_dir(&self, uuid: &RepositoryUuid) -> PathBuf {
        self.cache_root.join(uuid.as_str())
    }

    /// Path to the history cache database.
    pub fn cache_db_path(&self, uuid: &RepositoryUuid) -> PathBuf {
        self.repo_dir(uuid).join("cache.db")
    }

    /// Path to the per-repository configuration file.
    pub fn repo_config_path(&self, uuid: &RepositoryUuid) -> PathBuf {
        self.repo_dir(uuid).join("config.toml")
    }

    /// Directory holding branch lock files.
    pub fn locks_dir(&self, uuid: &RepositoryUuid) -> PathBuf {
        self.repo_dir(uuid).join("locks")
    }

    /// Lock file for a single branch.
    ///
    /// Branch paths contain slashes and arbitrary characters, so the file
    /// name is a digest of the path.
    pub fn branch_lock_path(&self, uuid: &RepositoryUuid, branch: &BranchPath) -> PathBuf {
        let digest = Sha256::digest(branch.as_str().as_bytes());
        let name = hex::encode(&digest[..12]);
        self.locks_dir(uuid).join(format!("{name}.lock"))
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Get the cache root as a Path reference.
    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    /// Ensure the directory structure for a repository exists.
    ///
    /// # Errors
    ///
    /// Returns an IO error if directory creation fails.
    pub fn ensure_dirs(&self, uuid: &RepositoryUuid) -> std::io::Result<()> {
        std::fs::create_dir_all(self.repo_dir(uuid))?;
        std::fs::create_dir_all(self.locks_dir(uuid))?;
        Ok(())
    }
}
