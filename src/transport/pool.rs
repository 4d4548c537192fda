//! transport::pool
//!
//! Reuse of idle sessions.
//!
//! # Policy
//!
//! [`ConnectionPool::get`] hands out, in order of preference:
//!
//! 1. an idle session already anchored at the requested URL
//! 2. an idle session of the same repository, reparented to the URL
//! 3. a fresh session from the [`Connector`]
//!
//! Sessions come back automatically when the [`PooledConnection`] guard is
//! dropped. A guard whose session hit an error it cannot recover from can
//! be [`discard`](PooledConnection::discard)ed instead.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::Transport;
use crate::core::Result;

/// Opens new sessions.
pub trait Connector: Send + Sync {
    fn connect(&self, url: &str) -> Result<Box<dyn Transport>>;
}

struct IdleConnection {
    repos_root: String,
    transport: Box<dyn Transport>,
}

/// A pool of idle sessions keyed by session URL.
pub struct ConnectionPool {
    connector: Arc<dyn Connector>,
    idle: Mutex<HashMap<String, Vec<IdleConnection>>>,
}

impl ConnectionPool {
    pub fn new(connector: Arc<dyn Connector>) -> Arc<Self> {
        Arc::new(Self {
            connector,
            idle: Mutex::new(HashMap::new()),
        })
    }

    /// A session anchored at `url`.
    pub fn get(self: &Arc<Self>, url: &str) -> Result<PooledConnection> {
        let url = url.trim_end_matches('/');
        if let Some(conn) = self.take_exact(url) {
            debug!(url, "reusing idle connection");
            return Ok(self.wrap(conn));
        }
        if let Some(mut conn) = self.take_same_repository(url) {
            debug!(from = conn.session_url(), to = url, "reparenting idle connection");
            match conn.reparent(url) {
                Ok(()) => return Ok(self.wrap(conn)),
                Err(e) => debug!(error = %e, "reparent failed; opening a new connection"),
            }
        }
        debug!(url, "opening new connection");
        let conn = self.connector.connect(url)?;
        Ok(self.wrap(conn))
    }

    /// Number of idle sessions.
    pub fn idle_count(&self) -> usize {
        self.idle.lock().values().map(Vec::len).sum()
    }

    fn wrap(self: &Arc<Self>, transport: Box<dyn Transport>) -> PooledConnection {
        PooledConnection {
            transport: Some(transport),
            pool: Arc::clone(self),
        }
    }

    fn take_exact(&self, url: &str) -> Option<Box<dyn Transport>> {
        let mut idle = self.idle.lock();
        let list = idle.get_mut(url)?;
        let conn = list.pop().map(|c| c.transport);
        if list.is_empty() {
            idle.remove(url);
        }
        conn
    }

    fn take_same_repository(&self, url: &str) -> Option<Box<dyn Transport>> {
        let mut idle = self.idle.lock();
        let key = idle
            .iter()
            .find(|(_, list)| {
                list.iter().any(|c| {
                    let root = c.repos_root.trim_end_matches('/');
                    url == root || url.starts_with(&format!("{root}/"))
                })
            })
            .map(|(key, _)| key.clone())?;
        let list = idle.get_mut(&key)?;
        let conn = list.pop().map(|c| c.transport);
        if list.is_empty() {
            idle.remove(&key);
        }
        conn
    }

    fn release(&self, transport: Box<dyn Transport>) {
        let repos_root = match transport.get_repos_root() {
            Ok(root) => root,
            Err(e) => {
                debug!(error = %e, "dropping connection that cannot report its root");
                return;
            }
        };
        let url = transport.session_url().trim_end_matches('/').to_string();
        self.idle.lock().entry(url).or_default().push(IdleConnection {
            repos_root,
            transport,
        });
    }
}

/// A session checked out of a [`ConnectionPool`].
pub struct PooledConnection {
    transport: Option<Box<dyn Transport>>,
    pool: Arc<ConnectionPool>,
}

impl PooledConnection {
    /// Close the session instead of returning it to the pool.
    pub fn discard(mut self) {
        self.transport = None;
    }
}

impl Deref for PooledConnection {
    type Target = dyn Transport;

    fn deref(&self) -> &Self::Target {
        match &self.transport {
            Some(t) => t.as_ref(),
            None => unreachable!("pooled connection used after release"),
        }
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.transport {
            Some(t) => t.as_mut(),
            None => unreachable!("pooled connection used after release"),
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(transport) = self.transport.take() {
            self.pool.release(transport);
        }
    }
}
