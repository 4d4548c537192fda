//! core::ops::lock
//!
//! Exclusive per-branch write lock.
//!
//! # Architecture
//!
//! Fetch and commit both mutate repository-wide cached state (inventories,
//! id maps, the revision metadata cache), so at most one synchronization may
//! be in flight per branch. The lock is an OS-level exclusive file lock
//! taken via `fs2`, which works across processes and, because each guard
//! opens its own file handle, between threads of one process too.
//!
//! # Invariants
//!
//! - Lock must be held for the entire fetch or commit of a branch
//! - Lock is automatically released on drop (RAII pattern)
//! - Lock acquisition is non-blocking (fails fast if locked)
//! - Different branches of the same repository never contend
//!
//! # Example
//!
//! ```ignore
//! use svnbridge::core::ops::lock::BranchLock;
//!
//! let lock = BranchLock::acquire(&paths, &uuid, &branch)?;
//! // fetch or commit while holding the lock
//! drop(lock);
//! ```

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;
use tracing::debug;

use crate::core::paths::BridgePaths;
use crate::core::types::{BranchPath, RepositoryUuid};

/// Errors from locking operations.
#[derive(Debug, Error)]
pub enum LockError {
    /// Another process or thread already holds the lock.
    #[error("branch '{branch}' is locked by another synchronization")]
    AlreadyLocked { branch: String },

    /// Failed to create lock file or directory.
    #[error("failed to create lock: {0}")]
    CreateFailed(String),

    /// Failed to acquire the OS lock.
    #[error("failed to acquire lock: {0}")]
    AcquireFailed(String),

    /// Failed to release the lock.
    #[error("failed to release lock: {0}")]
    ReleaseFailed(String),
}

/// An exclusive write lock on one branch.
#[derive(Debug)]
pub struct BranchLock {
    path: PathBuf,
    branch: BranchPath,
    /// When this is Some, we hold the lock.
    file: Option<File>,
}

impl BranchLock {
    /// Attempt to acquire the write lock for `branch`.
    ///
    /// # Errors
    ///
    /// - [`LockError::AlreadyLocked`] if the branch is being synchronized
    /// - [`LockError::CreateFailed`] if the lock file cannot be created
    /// - [`LockError::AcquireFailed`] if the OS lock cannot be acquired
    pub fn acquire(
        paths: &BridgePaths,
        uuid: &RepositoryUuid,
        branch: &BranchPath,
    ) -> Result<Self, LockError> {
        let locks_dir = paths.locks_dir(uuid);
        fs::create_dir_all(&locks_dir).map_err(|e| {
            LockError::CreateFailed(format!("cannot create {}: {}", locks_dir.display(), e))
        })?;

        let path = paths.branch_lock_path(uuid, branch);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| {
                LockError::CreateFailed(format!("cannot open {}: {}", path.display(), e))
            })?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!(branch = %branch, "acquired branch lock");
                Ok(Self {
                    path,
                    branch: branch.clone(),
                    file: Some(file),
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Err(LockError::AlreadyLocked {
                branch: branch.to_string(),
            }),
            Err(e) => Err(LockError::AcquireFailed(e.to_string())),
        }
    }

    /// Try to acquire the lock, returning None if already held.
    pub fn try_acquire(
        paths: &BridgePaths,
        uuid: &RepositoryUuid,
        branch: &BranchPath,
    ) -> Result<Option<Self>, LockError> {
        match Self::acquire(paths, uuid, branch) {
            Ok(lock) => Ok(Some(lock)),
            Err(LockError::AlreadyLocked { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Check if the lock is currently held.
    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }

    /// The branch this lock guards.
    pub fn branch(&self) -> &BranchPath {
        &self.branch
    }

    /// Get the path to the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock explicitly.
    pub fn release(&mut self) -> Result<(), LockError> {
        if let Some(file) = self.file.take() {
            file.unlock()
                .map_err(|e| LockError::ReleaseFailed(e.to_string()))?;
            debug!(branch = %self.branch, "released branch lock");
        }
        Ok(())
    }
}

impl Drop for BranchLock {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = file.unlock();
        }
    }
}
