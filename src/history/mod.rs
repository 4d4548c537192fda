//! history
//!
//! Changed-path history of the source repository.
//!
//! # Walkers
//!
//! A [`LogWalker`] answers "what did revision N change" and follows paths
//! backward through copies. Two implementations exist:
//!
//! - [`HistoryCache`] persists changed paths in SQLite and fills itself
//!   incrementally from the server
//! - [`DirectLogWalker`] asks the server every time
//!
//! Both are driven through the same trait, so the rest of the engine does
//! not care whether the cache is enabled.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use svnbridge::history::{HistoryCache, LogWalker};
//! use svnbridge::transport::{ConnectionPool, MemoryConnector, MemoryRepository};
//!
//! let repo = MemoryRepository::new("mem://demo");
//! let mut txn = repo.begin("ann", "add trunk");
//! txn.mkdir("trunk").unwrap();
//! txn.commit().unwrap();
//!
//! let pool = ConnectionPool::new(Arc::new(MemoryConnector::new().with_repository(repo)));
//! let cache = HistoryCache::in_memory(pool, "mem://demo", Default::default()).unwrap();
//! let paths = cache.revision_paths(1, None).unwrap();
//! assert!(paths.contains_key("trunk"));
//! ```

pub mod cache;
pub mod changes;
pub mod direct;
pub mod log_stream;

pub use cache::{CacheOptions, HistoryCache};
pub use changes::{path_is_child, rebase_path};
pub use direct::DirectLogWalker;
pub use log_stream::{LogStream, LogStreamOutcome};
pub use crate::transport::{ChangeAction, ChangedPath, ChangedPaths};

use thiserror::Error;

use crate::core::types::RevNum;
use crate::core::Result;

/// Errors from the persisted history cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("revision {revnum} does not exist in the repository")]
    NoSuchRevision { revnum: RevNum },

    #[error("log ended before r{expected}{}", got.map(|r| format!(" (next entry was r{r})")).unwrap_or_default())]
    IncompleteLog { expected: RevNum, got: Option<RevNum> },

    #[error("history cache database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("corrupt history cache row for '{path}' in r{revnum}: {reason}")]
    Corrupt {
        revnum: RevNum,
        path: String,
        reason: String,
    },

    #[error("cannot create history cache directory: {0}")]
    Io(#[from] std::io::Error),
}

/// The changes revision 0 always has.
pub fn initial_revision_paths() -> ChangedPaths {
    let mut paths = ChangedPaths::new();
    paths.insert(String::new(), ChangedPath::new(ChangeAction::Add));
    paths
}

/// Read access to the changed-path history.
pub trait LogWalker: Send + Sync {
    /// Newest revision in the repository.
    fn latest_revnum(&self) -> Result<RevNum>;

    /// Paths changed in `revnum`.
    ///
    /// With `path`, only changes to that path, its subtree and its added or
    /// replaced ancestors are returned.
    fn revision_paths(&self, revnum: RevNum, path: Option<&str>) -> Result<ChangedPaths>;

    /// Most recent revision `<= revnum` that touched `path`, its subtree, or
    /// an ancestor it was copied in with.
    fn find_latest_change(&self, path: &str, revnum: RevNum) -> Result<Option<RevNum>>;

    /// Where `path@revnum` lived in the revision before.
    ///
    /// `None` once the path did not exist any more. Every step strictly
    /// lowers the revision number, so following it terminates.
    fn previous_location(&self, path: &str, revnum: RevNum) -> Result<Option<(String, RevNum)>> {
        if revnum == 0 {
            return Ok(None);
        }
        if path.is_empty() {
            return Ok(Some((String::new(), revnum - 1)));
        }
        let changes = self.revision_paths(revnum, Some(path))?;
        Ok(changes::find_prev_location(&changes, path, revnum))
    }

    /// Forget anything derived from the latest revision number.
    fn invalidate(&self) {}
}

impl<'w> dyn LogWalker + 'w {
    /// Walk `path@revnum` back to its creation.
    ///
    /// ```
    /// use std::sync::Arc;
    /// use svnbridge::history::{DirectLogWalker, LogWalker};
    /// use svnbridge::transport::{ConnectionPool, MemoryConnector, MemoryRepository};
    ///
    /// let repo = MemoryRepository::new("mem://walk");
    /// let mut txn = repo.begin("ann", "r1");
    /// txn.mkdir("trunk").unwrap();
    /// txn.commit().unwrap();
    /// let mut txn = repo.begin("ann", "r2");
    /// txn.put_file("trunk/a", b"a").unwrap();
    /// txn.commit().unwrap();
    ///
    /// let pool = ConnectionPool::new(Arc::new(MemoryConnector::new().with_repository(repo)));
    /// let walker: Box<dyn LogWalker> = Box::new(DirectLogWalker::new(pool, "mem://walk"));
    /// let revs: Vec<_> = walker
    ///     .iterate_changes("trunk", 2)
    ///     .map(|step| step.unwrap().2)
    ///     .collect();
    /// assert_eq!(revs, vec![2, 1]);
    /// ```
    pub fn iterate_changes(&self, path: &str, revnum: RevNum) -> ChangeIter<'_> {
        ChangeIter {
            walker: self,
            next: Some((path.trim_matches('/').to_string(), revnum)),
        }
    }
}

/// One revision that touched a path: `(path at that revision, changes, revnum)`.
pub type ChangeStep = (String, ChangedPaths, RevNum);

/// Iterator returned by [`iterate_changes`](LogWalker#method.iterate_changes).
///
/// Stops after the path's creation or after the first error.
pub struct ChangeIter<'a> {
    walker: &'a dyn LogWalker,
    next: Option<(String, RevNum)>,
}

impl Iterator for ChangeIter<'_> {
    type Item = Result<ChangeStep>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (path, revnum) = self.next.take()?;
            let changes = if revnum == 0 && !path.is_empty() {
                ChangedPaths::new()
            } else {
                match self.walker.revision_paths(revnum, Some(&path)) {
                    Ok(changes) => changes,
                    Err(e) => return Some(Err(e)),
                }
            };
            self.next = if path.is_empty() {
                revnum.checked_sub(1).map(|prev| (String::new(), prev))
            } else {
                changes::find_prev_location(&changes, &path, revnum)
            };
            if !changes.is_empty() {
                return Some(Ok((path, changes, revnum)));
            }
        }
    }
}
