//! history::log_stream
//!
//! Streaming `get_log` on a worker thread.
//!
//! The worker owns a pooled session and pushes entries into a bounded
//! channel; the consumer pulls them lazily through [`Iterator`]. When the
//! consumer goes away early the worker keeps draining the server response
//! (a log exchange cannot be interrupted mid-flight) and discards what is
//! left. The session goes back to the pool when the worker finishes.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver};
use tracing::debug;

use crate::core::errors::BridgeError;
use crate::core::types::RevNum;
use crate::core::Result;
use crate::transport::{LogEntry, PooledConnection};

/// Entries buffered between worker and consumer.
const CHANNEL_CAPACITY: usize = 64;

/// How a worker finished.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogStreamOutcome {
    /// Entries handed to the consumer.
    pub delivered: usize,
    /// Entries read after the consumer went away.
    pub discarded: usize,
    /// Whether the consumer dropped the stream early.
    pub cancelled: bool,
}

/// Parameters of one log request.
#[derive(Debug, Clone)]
pub struct LogRequest {
    pub paths: Vec<String>,
    pub start: RevNum,
    pub end: RevNum,
    pub limit: usize,
    pub discover_changed_paths: bool,
}

impl LogRequest {
    /// Every revision between `start` and `end`, with changed paths.
    pub fn range(start: RevNum, end: RevNum) -> Self {
        Self {
            paths: vec![String::new()],
            start,
            end,
            limit: 0,
            discover_changed_paths: true,
        }
    }
}

/// A log request running on its own thread.
pub struct LogStream {
    rx: Option<Receiver<Result<LogEntry>>>,
    worker: Option<JoinHandle<LogStreamOutcome>>,
}

impl LogStream {
    /// Start the request on `conn`.
    pub fn spawn(conn: PooledConnection, request: LogRequest) -> Self {
        let (tx, rx) = bounded(CHANNEL_CAPACITY);
        let worker = thread::spawn(move || {
            let mut outcome = LogStreamOutcome::default();
            let result = conn.get_log(
                &request.paths,
                request.start,
                request.end,
                request.limit,
                request.discover_changed_paths,
                &mut |entry| {
                    if outcome.cancelled {
                        outcome.discarded += 1;
                    } else if tx.send(Ok(entry)).is_ok() {
                        outcome.delivered += 1;
                    } else {
                        outcome.cancelled = true;
                        outcome.discarded += 1;
                    }
                    Ok(())
                },
            );
            if let Err(e) = result {
                if tx.send(Err(e)).is_err() {
                    outcome.cancelled = true;
                }
            }
            if outcome.cancelled {
                debug!(
                    error = %BridgeError::Cancelled,
                    delivered = outcome.delivered,
                    discarded = outcome.discarded,
                    "log consumer went away"
                );
            }
            outcome
        });
        Self {
            rx: Some(rx),
            worker: Some(worker),
        }
    }

    /// Stop consuming and wait for the worker to finish.
    pub fn abandon(mut self) -> Result<LogStreamOutcome> {
        self.rx = None;
        self.join()
    }

    /// Wait for the worker after the stream has been read to the end.
    pub fn finish(mut self) -> Result<LogStreamOutcome> {
        self.join()
    }

    fn join(&mut self) -> Result<LogStreamOutcome> {
        self.rx = None;
        match self.worker.take() {
            Some(worker) => worker
                .join()
                .map_err(|_| BridgeError::Internal("log worker panicked".to_string())),
            None => Ok(LogStreamOutcome::default()),
        }
    }
}

impl Iterator for LogStream {
    type Item = Result<LogEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.rx.as_ref()?.recv().ok()
    }
}

impl Drop for LogStream {
    fn drop(&mut self) {
        // the worker detaches and finishes on its own
        self.rx = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::transport::memory::{FailOn, MemoryConnector, MemoryRepository};
    use crate::transport::ConnectionPool;

    fn repo_with(revisions: usize) -> (MemoryRepository, Arc<ConnectionPool>) {
        let repo = MemoryRepository::new("mem://log");
        for i in 0..revisions {
            let mut txn = repo.begin("ann", "change");
            txn.put_file(&format!("f{i}"), b"x").unwrap();
            txn.commit().unwrap();
        }
        let pool = ConnectionPool::new(Arc::new(
            MemoryConnector::new().with_repository(repo.clone()),
        ));
        (repo, pool)
    }

    #[test]
    fn streams_in_order() {
        let (_repo, pool) = repo_with(5);
        let conn = pool.get("mem://log").unwrap();
        let mut stream = LogStream::spawn(conn, LogRequest::range(1, 5));
        let revs: Vec<RevNum> = stream.by_ref().map(|e| e.unwrap().revnum).collect();
        assert_eq!(revs, vec![1, 2, 3, 4, 5]);
        let outcome = stream.finish().unwrap();
        assert_eq!(outcome.delivered, 5);
        assert!(!outcome.cancelled);
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn dropped_consumer_drains_and_returns_connection() {
        let (_repo, pool) = repo_with(200);
        let conn = pool.get("mem://log").unwrap();
        let mut stream = LogStream::spawn(conn, LogRequest::range(200, 1));
        assert_eq!(stream.next().unwrap().unwrap().revnum, 200);
        let outcome = stream.abandon().unwrap();
        assert!(outcome.cancelled);
        assert_eq!(outcome.delivered + outcome.discarded, 200);
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn server_error_reaches_consumer() {
        let (repo, pool) = repo_with(3);
        repo.set_fail_on(FailOn::GetLog { after: 1 });
        let conn = pool.get("mem://log").unwrap();
        let results: Vec<_> = LogStream::spawn(conn, LogRequest::range(1, 3)).collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
    }
}
