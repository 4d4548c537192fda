//! history::cache
//!
//! Persisted changed-path history.
//!
//! # Schema
//!
//! ```text
//! changed_path(rev, action, path, copyfrom_path NULL, copyfrom_rev DEFAULT -1)
//!   UNIQUE (rev, path)
//! watermark(id = 0, revnum)
//! ```
//!
//! Rows are written with `INSERT OR IGNORE`; a `(rev, path)` row, once
//! stored, is never rewritten. The watermark is updated in the same
//! transaction as the rows it covers, so after a crash it still names the
//! newest revision whose rows are all on disk.
//!
//! # Population
//!
//! Queries beyond the watermark pull the missing revisions from the server
//! in one log request, committing every `flush_every` revisions.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Transaction};
use tracing::{debug, info};

use super::changes;
use super::log_stream::{LogRequest, LogStream};
use super::{initial_revision_paths, CacheError, LogWalker};
use crate::core::config::Config;
use crate::core::errors::BridgeError;
use crate::core::types::RevNum;
use crate::core::Result;
use crate::transport::{ChangeAction, ChangedPath, ChangedPaths, ConnectionPool, CopyFrom};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS changed_path (
    rev INTEGER NOT NULL,
    action TEXT NOT NULL,
    path TEXT NOT NULL,
    copyfrom_path TEXT,
    copyfrom_rev INTEGER NOT NULL DEFAULT -1
);
CREATE UNIQUE INDEX IF NOT EXISTS changed_path_rev_path ON changed_path (rev, path);
CREATE INDEX IF NOT EXISTS changed_path_path ON changed_path (path);
CREATE TABLE IF NOT EXISTS watermark (
    id INTEGER PRIMARY KEY CHECK (id = 0),
    revnum INTEGER NOT NULL
);
";

/// Tuning knobs for cache population.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOptions {
    /// Revisions per committed transaction.
    pub flush_every: u64,
    /// Minimum number of revisions fetched per population round.
    pub log_batch_size: u64,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            flush_every: Config::DEFAULT_FLUSH_EVERY,
            log_batch_size: Config::DEFAULT_LOG_BATCH_SIZE,
        }
    }
}

impl CacheOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            flush_every: config.flush_every(),
            log_batch_size: config.log_batch_size(),
        }
    }
}

/// One stored row, as shown by `cache show`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRow {
    pub revnum: RevNum,
    pub path: String,
    pub change: ChangedPath,
}

/// SQLite-backed [`LogWalker`].
pub struct HistoryCache {
    db: Mutex<Connection>,
    pool: Arc<ConnectionPool>,
    repos_url: String,
    options: CacheOptions,
    latest: Mutex<Option<RevNum>>,
}

impl HistoryCache {
    /// Open (or create) the cache database at `path`.
    pub fn open(
        path: &Path,
        pool: Arc<ConnectionPool>,
        repos_url: &str,
        options: CacheOptions,
    ) -> Result<Self, CacheError> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        debug!(path = %path.display(), "opened history cache");
        Self::with_connection(conn, pool, repos_url, options)
    }

    /// A cache that lives only as long as this value.
    pub fn in_memory(
        pool: Arc<ConnectionPool>,
        repos_url: &str,
        options: CacheOptions,
    ) -> Result<Self, CacheError> {
        Self::with_connection(Connection::open_in_memory()?, pool, repos_url, options)
    }

    fn with_connection(
        conn: Connection,
        pool: Arc<ConnectionPool>,
        repos_url: &str,
        options: CacheOptions,
    ) -> Result<Self, CacheError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            db: Mutex::new(conn),
            pool,
            repos_url: repos_url.trim_end_matches('/').to_string(),
            options,
            latest: Mutex::new(None),
        })
    }

    /// Newest revision whose rows are all stored.
    pub fn watermark(&self) -> Result<RevNum, CacheError> {
        read_watermark(&self.db.lock())
    }

    /// Store the changes of several revisions and advance the watermark,
    /// all in one transaction.
    pub fn store(
        &self,
        revisions: &[(RevNum, ChangedPaths)],
        watermark: RevNum,
    ) -> Result<(), CacheError> {
        let mut db = self.db.lock();
        store_batch(&mut db, revisions, watermark)
    }

    /// Stored rows for revisions in `from..=to`.
    pub fn rows(&self, from: RevNum, to: RevNum) -> Result<Vec<CacheRow>, CacheError> {
        select_rows(&self.db.lock(), from, to)
    }

    /// Watermark and rows of an existing cache file, opened read-only.
    pub fn inspect(path: &Path, from: RevNum, to: RevNum) -> Result<(RevNum, Vec<CacheRow>), CacheError> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        Ok((read_watermark(&conn)?, select_rows(&conn, from, to)?))
    }

    /// Make sure every revision up to `revnum` is stored.
    pub fn fetch_revisions(&self, revnum: RevNum) -> Result<()> {
        let mut db = self.db.lock();
        let watermark = read_watermark(&db)?;
        if revnum <= watermark {
            return Ok(());
        }
        let mut latest = self.latest_revnum()?;
        if revnum > latest {
            self.invalidate();
            latest = self.latest_revnum()?;
            if revnum > latest {
                return Err(CacheError::NoSuchRevision { revnum }.into());
            }
        }
        let batch_end = latest.min(watermark.saturating_add(self.options.log_batch_size));
        let target = revnum.max(batch_end);
        info!(from = watermark + 1, to = target, "filling history cache");

        let conn = self.pool.get(&self.repos_url)?;
        let mut stream = LogStream::spawn(conn, LogRequest::range(watermark + 1, target));
        let flush_every = self.options.flush_every.max(1);
        let mut pending: Vec<(RevNum, ChangedPaths)> = Vec::new();
        let mut batch_start = watermark + 1;
        let mut next = watermark + 1;
        for entry in stream.by_ref() {
            let entry = entry.map_err(|e| match e {
                BridgeError::NoSuchRevision { revnum } => {
                    BridgeError::from(CacheError::NoSuchRevision { revnum })
                }
                other => other,
            })?;
            let entry_rev = entry.revnum;
            if entry_rev != next {
                return Err(CacheError::IncompleteLog { expected: next, got: Some(entry_rev) }.into());
            }
            next += 1;
            pending.push((entry_rev, entry.changed_paths.unwrap_or_default()));
            if entry_rev + 1 - batch_start >= flush_every {
                store_batch(&mut db, &pending, entry_rev)?;
                debug!(watermark = entry_rev, "flushed history cache batch");
                pending.clear();
                batch_start = entry_rev + 1;
            }
        }
        stream.finish()?;
        if next != target + 1 {
            return Err(CacheError::IncompleteLog { expected: next, got: None }.into());
        }
        store_batch(&mut db, &pending, target)?;
        Ok(())
    }

    fn stored_paths(&self, revnum: RevNum) -> Result<ChangedPaths, CacheError> {
        let db = self.db.lock();
        let mut stmt = db.prepare_cached(
            "SELECT rev, action, path, copyfrom_path, copyfrom_rev FROM changed_path WHERE rev = ?1",
        )?;
        let raw = stmt
            .query_map(params![sql_rev(revnum)], RawRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        raw.into_iter()
            .map(|r| r.into_row().map(|row| (row.path, row.change)))
            .collect()
    }

    fn latest_touching(&self, path: &str, revnum: RevNum) -> Result<Option<RevNum>, CacheError> {
        let db = self.db.lock();
        let rev = sql_rev(revnum);
        if path.is_empty() {
            let found: Option<i64> = db.query_row(
                "SELECT MAX(rev) FROM changed_path WHERE rev <= ?1",
                params![rev],
                |row| row.get(0),
            )?;
            return Ok(Some(found.map_or(0, from_sql_rev)));
        }
        let mut best: Option<i64> = db.query_row(
            "SELECT MAX(rev) FROM changed_path
             WHERE rev <= ?1 AND (path = ?2 OR path LIKE ?3 ESCAPE '\\')",
            params![rev, path, format!("{}/%", escape_like(path))],
            |row| row.get(0),
        )?;
        let mut stmt = db.prepare_cached(
            "SELECT MAX(rev) FROM changed_path
             WHERE rev <= ?1 AND path = ?2 AND action IN ('A', 'R')",
        )?;
        for ancestor in ancestors(path) {
            let found: Option<i64> = stmt.query_row(params![rev, ancestor], |row| row.get(0))?;
            best = best.max(found);
        }
        Ok(best.map(from_sql_rev))
    }
}

impl LogWalker for HistoryCache {
    fn latest_revnum(&self) -> Result<RevNum> {
        let mut latest = self.latest.lock();
        if let Some(revnum) = *latest {
            return Ok(revnum);
        }
        let revnum = self.pool.get(&self.repos_url)?.get_latest_revnum()?;
        *latest = Some(revnum);
        Ok(revnum)
    }

    fn revision_paths(&self, revnum: RevNum, path: Option<&str>) -> Result<ChangedPaths> {
        let all = if revnum == 0 {
            initial_revision_paths()
        } else {
            self.fetch_revisions(revnum)?;
            self.stored_paths(revnum)?
        };
        Ok(match path {
            Some(path) => changes::filter_changes(&all, path.trim_matches('/')),
            None => all,
        })
    }

    fn find_latest_change(&self, path: &str, revnum: RevNum) -> Result<Option<RevNum>> {
        if revnum > 0 {
            self.fetch_revisions(revnum)?;
        }
        Ok(self.latest_touching(path.trim_matches('/'), revnum)?)
    }

    fn invalidate(&self) {
        *self.latest.lock() = None;
    }
}

struct RawRow {
    rev: i64,
    action: String,
    path: String,
    copyfrom_path: Option<String>,
    copyfrom_rev: i64,
}

impl RawRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            rev: row.get(0)?,
            action: row.get(1)?,
            path: row.get(2)?,
            copyfrom_path: row.get(3)?,
            copyfrom_rev: row.get(4)?,
        })
    }

    fn into_row(self) -> Result<CacheRow, CacheError> {
        let revnum = from_sql_rev(self.rev);
        let corrupt = |reason: String| CacheError::Corrupt {
            revnum,
            path: self.path.clone(),
            reason,
        };
        let action = self
            .action
            .chars()
            .next()
            .filter(|_| self.action.len() == 1)
            .and_then(ChangeAction::from_char)
            .ok_or_else(|| corrupt(format!("unknown action '{}'", self.action)))?;
        let copyfrom = match (self.copyfrom_path, self.copyfrom_rev) {
            (Some(p), r) if r >= 0 => Some(CopyFrom::new(p, from_sql_rev(r))),
            (Some(_), r) => return Err(corrupt(format!("copy source revision {r}"))),
            (None, _) => None,
        };
        Ok(CacheRow {
            revnum,
            path: self.path,
            change: ChangedPath { action, copyfrom },
        })
    }
}

fn select_rows(db: &Connection, from: RevNum, to: RevNum) -> Result<Vec<CacheRow>, CacheError> {
    let mut stmt = db.prepare_cached(
        "SELECT rev, action, path, copyfrom_path, copyfrom_rev FROM changed_path
         WHERE rev >= ?1 AND rev <= ?2 ORDER BY rev, path",
    )?;
    let raw = stmt
        .query_map(params![sql_rev(from), sql_rev(to)], RawRow::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    raw.into_iter().map(RawRow::into_row).collect()
}

fn read_watermark(db: &Connection) -> Result<RevNum, CacheError> {
    let revnum: Option<i64> = db
        .query_row("SELECT revnum FROM watermark WHERE id = 0", [], |row| row.get(0))
        .optional()?;
    Ok(revnum.map_or(0, from_sql_rev))
}

fn store_batch(
    db: &mut Connection,
    revisions: &[(RevNum, ChangedPaths)],
    watermark: RevNum,
) -> Result<(), CacheError> {
    let tx = db.transaction()?;
    for (revnum, paths) in revisions {
        insert_rows(&tx, *revnum, paths)?;
    }
    tx.execute(
        "INSERT INTO watermark (id, revnum) VALUES (0, ?1)
         ON CONFLICT (id) DO UPDATE SET revnum = excluded.revnum
         WHERE excluded.revnum > watermark.revnum",
        params![sql_rev(watermark)],
    )?;
    tx.commit()?;
    Ok(())
}

fn insert_rows(tx: &Transaction<'_>, revnum: RevNum, paths: &ChangedPaths) -> Result<(), CacheError> {
    let mut stmt = tx.prepare_cached(
        "INSERT OR IGNORE INTO changed_path (rev, action, path, copyfrom_path, copyfrom_rev)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for (path, change) in paths {
        let (cf_path, cf_rev) = match &change.copyfrom {
            Some(from) => (Some(from.path.as_str()), sql_rev(from.revnum)),
            None => (None, -1),
        };
        stmt.execute(params![
            sql_rev(revnum),
            change.action.as_char().to_string(),
            path,
            cf_path,
            cf_rev
        ])?;
    }
    Ok(())
}

/// Strict ancestors of `path`, including the root.
fn ancestors(path: &str) -> Vec<&str> {
    let mut out = vec![""];
    out.extend(
        path.char_indices()
            .filter(|(_, c)| *c == '/')
            .map(|(i, _)| &path[..i]),
    );
    out
}

fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn sql_rev(revnum: RevNum) -> i64 {
    i64::try_from(revnum).unwrap_or(i64::MAX)
}

fn from_sql_rev(rev: i64) -> RevNum {
    RevNum::try_from(rev).unwrap_or_default()
}
