//! history::direct
//!
//! A [`LogWalker`] that asks the server every time.

use std::sync::Arc;

use super::changes;
use super::log_stream::{LogRequest, LogStream};
use super::{initial_revision_paths, ChangedPaths, LogWalker};
use crate::core::types::RevNum;
use crate::core::Result;
use crate::transport::ConnectionPool;

/// Uncached log walker, used when the history cache is disabled.
pub struct DirectLogWalker {
    pool: Arc<ConnectionPool>,
    repos_url: String,
}

impl DirectLogWalker {
    pub fn new(pool: Arc<ConnectionPool>, repos_url: &str) -> Self {
        Self {
            pool,
            repos_url: repos_url.trim_end_matches('/').to_string(),
        }
    }
}

impl LogWalker for DirectLogWalker {
    fn latest_revnum(&self) -> Result<RevNum> {
        self.pool.get(&self.repos_url)?.get_latest_revnum()
    }

    fn revision_paths(&self, revnum: RevNum, path: Option<&str>) -> Result<ChangedPaths> {
        let all = if revnum == 0 {
            initial_revision_paths()
        } else {
            let conn = self.pool.get(&self.repos_url)?;
            let mut found = ChangedPaths::new();
            conn.get_log(&[String::new()], revnum, revnum, 1, true, &mut |entry| {
                if let Some(paths) = entry.changed_paths {
                    found = paths;
                }
                Ok(())
            })?;
            found
        };
        Ok(match path {
            Some(path) => changes::filter_changes(&all, path.trim_matches('/')),
            None => all,
        })
    }

    fn find_latest_change(&self, path: &str, revnum: RevNum) -> Result<Option<RevNum>> {
        let path = path.trim_matches('/');
        if revnum == 0 {
            return Ok(path.is_empty().then_some(0));
        }
        let conn = self.pool.get(&self.repos_url)?;
        let mut stream = LogStream::spawn(conn, LogRequest::range(revnum, 1));
        for entry in stream.by_ref() {
            let entry = entry?;
            let touched = entry
                .changed_paths
                .as_ref()
                .is_some_and(|c| changes::changes_path(c, path, true));
            if touched {
                // the rest of the log is drained in the background
                return Ok(Some(entry.revnum));
            }
        }
        stream.finish()?;
        Ok(path.is_empty().then_some(0))
    }
}
