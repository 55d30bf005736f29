//! Bounded connection pool, one per credential set.
//!
//! # Invariants
//! - At most `max_connections` connections are open at once.
//! - At most half of the cap is kept idle; surplus returns are closed.
//! - Every handed-out connection has migrations applied.

use super::open::open_db;
use super::{DbError, DbResult};
use log::{debug, warn};
use parking_lot::{Condvar, Mutex};
use rusqlite::Connection;
use std::ops::Deref;
use std::path::PathBuf;
use std::time::{Duration, Instant};

const DEFAULT_CHECKOUT_TIMEOUT: Duration = Duration::from_secs(10);

/// Pool sizing for one credential set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    /// Label used in logs and errors (`shared` / `owner`).
    pub label: &'static str,
    /// Database file path.
    pub path: PathBuf,
    /// Hard cap on open connections. Values below 1 are treated as 1.
    pub max_connections: usize,
    /// How long `get` waits for a free connection.
    pub checkout_timeout: Duration,
}

impl PoolSettings {
    pub fn new(label: &'static str, path: impl Into<PathBuf>, max_connections: usize) -> Self {
        Self {
            label,
            path: path.into(),
            max_connections,
            checkout_timeout: DEFAULT_CHECKOUT_TIMEOUT,
        }
    }

    fn max_idle(&self) -> usize {
        (self.max_connections / 2).max(1)
    }
}

struct PoolState {
    idle: Vec<Connection>,
    open: usize,
}

/// Blocking connection pool over one SQLite database file.
pub struct ConnectionPool {
    settings: PoolSettings,
    state: Mutex<PoolState>,
    returned: Condvar,
}

impl ConnectionPool {
    pub fn new(mut settings: PoolSettings) -> Self {
        settings.max_connections = settings.max_connections.max(1);
        Self {
            settings,
            state: Mutex::new(PoolState {
                idle: Vec::new(),
                open: 0,
            }),
            returned: Condvar::new(),
        }
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    /// Number of currently open connections (idle plus checked out).
    pub fn open_connections(&self) -> usize {
        self.state.lock().open
    }

    /// Number of idle connections ready for reuse.
    pub fn idle_connections(&self) -> usize {
        self.state.lock().idle.len()
    }

    /// Checks out one connection, opening a new one while under the cap.
    ///
    /// # Errors
    /// - `DbError::PoolTimeout` when the cap is reached and nothing is
    ///   returned within `checkout_timeout`.
    /// - Any open/migration error from `open_db`.
    pub fn get(&self) -> DbResult<PooledConnection<'_>> {
        let started_at = Instant::now();
        let deadline = started_at + self.settings.checkout_timeout;
        let mut state = self.state.lock();

        loop {
            if let Some(conn) = state.idle.pop() {
                return Ok(PooledConnection::new(self, conn, false));
            }

            if state.open < self.settings.max_connections {
                // Reserve the slot before releasing the lock to open.
                state.open += 1;
                drop(state);
                return match open_db(&self.settings.path) {
                    Ok(conn) => {
                        debug!(
                            "event=pool_open module=db status=ok pool={}",
                            self.settings.label
                        );
                        Ok(PooledConnection::new(self, conn, true))
                    }
                    Err(err) => {
                        self.release_slot();
                        Err(err)
                    }
                };
            }

            if self.returned.wait_until(&mut state, deadline).timed_out() {
                warn!(
                    "event=pool_checkout module=db status=error pool={} error_code=pool_timeout waited_ms={}",
                    self.settings.label,
                    started_at.elapsed().as_millis()
                );
                return Err(DbError::PoolTimeout {
                    pool: self.settings.label,
                    waited_ms: started_at.elapsed().as_millis(),
                });
            }
        }
    }

    fn give_back(&self, conn: Connection) {
        let mut state = self.state.lock();
        if state.idle.len() < self.settings.max_idle() {
            state.idle.push(conn);
        } else {
            state.open -= 1;
            drop(conn);
        }
        self.returned.notify_one();
    }

    fn release_slot(&self) {
        let mut state = self.state.lock();
        state.open -= 1;
        self.returned.notify_one();
    }
}

/// Connection checked out from a `ConnectionPool`; returned on drop.
pub struct PooledConnection<'pool> {
    pool: &'pool ConnectionPool,
    conn: Option<Connection>,
    fresh: bool,
}

impl<'pool> PooledConnection<'pool> {
    fn new(pool: &'pool ConnectionPool, conn: Connection, fresh: bool) -> Self {
        Self {
            pool,
            conn: Some(conn),
            fresh,
        }
    }

    /// True on the first checkout after the connection was opened.
    ///
    /// Per-connection setup checks only need to run while this holds; a
    /// reused connection already passed them.
    pub fn is_fresh(&self) -> bool {
        self.fresh
    }

    /// Closes the connection instead of returning it for reuse.
    pub fn discard(mut self) {
        if let Some(conn) = self.conn.take() {
            drop(conn);
            self.pool.release_slot();
        }
    }
}

impl Deref for PooledConnection<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn
            .as_ref()
            .expect("pooled connection is present until drop")
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.give_back(conn);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ConnectionPool, PoolSettings};
    use crate::db::DbError;
    use std::time::Duration;

    fn temp_pool(max_connections: usize) -> (tempfile::TempDir, ConnectionPool) {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = PoolSettings::new("test", dir.path().join("pool.db"), max_connections);
        settings.checkout_timeout = Duration::from_millis(50);
        (dir, ConnectionPool::new(settings))
    }

    #[test]
    fn checkout_reuses_returned_connection() {
        let (_dir, pool) = temp_pool(2);
        {
            let conn = pool.get().unwrap();
            assert!(conn.is_fresh());
            conn.execute_batch("SELECT 1;").unwrap();
        }
        assert_eq!(pool.open_connections(), 1);
        assert_eq!(pool.idle_connections(), 1);

        let again = pool.get().unwrap();
        assert!(!again.is_fresh(), "reused connection is not fresh");
        assert_eq!(pool.open_connections(), 1);
        assert_eq!(pool.idle_connections(), 0);
    }

    #[test]
    fn checkout_times_out_at_cap() {
        let (_dir, pool) = temp_pool(1);
        let _held = pool.get().unwrap();

        let err = pool.get().err().expect("second checkout must time out");
        assert!(matches!(err, DbError::PoolTimeout { pool: "test", .. }));
    }

    #[test]
    fn discarded_connection_frees_its_slot() {
        let (_dir, pool) = temp_pool(1);
        pool.get().unwrap().discard();
        assert_eq!(pool.open_connections(), 0);
        assert_eq!(pool.idle_connections(), 0);

        let next = pool.get().unwrap();
        assert!(next.is_fresh());
    }

    #[test]
    fn surplus_returns_are_closed() {
        let (_dir, pool) = temp_pool(4);
        let a = pool.get().unwrap();
        let b = pool.get().unwrap();
        let c = pool.get().unwrap();
        assert_eq!(pool.open_connections(), 3);

        drop(a);
        drop(b);
        drop(c);
        assert_eq!(pool.idle_connections(), 2);
        assert_eq!(pool.open_connections(), 2);
    }
}
