//! A fixed-size pool of validated back-end handles (spec.md §4.2 / C2).
//!
//! Mirrors Kannel's `dbpool`: a pool is filled with `max_conns` handles at
//! creation time through a driver-supplied [`ConnOps`] vtable-equivalent
//! trait. `consume()` blocks until a handle is available; the returned
//! [`PooledConn`] guard calls `produce()` automatically when dropped, so
//! the `consume`/`produce` discipline the spec describes can never be
//! unbalanced by a forgotten return.
//!
//! Before handing a handle out, the pool calls [`ConnOps::check`]; on
//! failure the handle is closed and transparently replaced by a freshly
//! opened one.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Condvar, Mutex};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum DbPoolError {
    #[error("failed to open back-end connection: {0}")]
    Open(String),
}

/// Back-end driver contract. Implementations provide how a connection is
/// opened, closed, and liveness-checked; SQL-capable drivers additionally
/// implement query operations on top via their own trait (see the
/// `dlr-store` crate).
pub trait ConnOps: Send + Sync + 'static {
    type Conn: Send + 'static;

    fn open(&self) -> Result<Self::Conn, DbPoolError>;

    /// Returns `true` if `conn` is still usable.
    fn check(&self, conn: &mut Self::Conn) -> bool;

    /// Best-effort teardown; failures are logged, never propagated.
    fn close(&self, _conn: Self::Conn) {}
}

struct Shared<O: ConnOps> {
    ops: O,
    idle: Mutex<VecDeque<O::Conn>>,
    not_empty: Condvar,
    max_conns: usize,
}

/// A fixed-size pool of `O::Conn` handles.
pub struct DbPool<O: ConnOps>(Arc<Shared<O>>);

impl<O: ConnOps> Clone for DbPool<O> {
    fn clone(&self) -> Self {
        DbPool(self.0.clone())
    }
}

impl<O: ConnOps> DbPool<O> {
    pub fn create(ops: O, max_conns: usize) -> Result<Self, DbPoolError> {
        let mut idle = VecDeque::with_capacity(max_conns);
        for _ in 0..max_conns {
            idle.push_back(ops.open()?);
        }
        Ok(DbPool(Arc::new(Shared {
            ops,
            idle: Mutex::new(idle),
            not_empty: Condvar::new(),
            max_conns,
        })))
    }

    /// Blocks until a handle is available, re-validating (and
    /// transparently replacing, if necessary) it before returning.
    pub fn consume(&self) -> PooledConn<O> {
        let mut idle = self.0.idle.lock().unwrap();
        loop {
            if let Some(mut conn) = idle.pop_front() {
                if !self.0.ops.check(&mut conn) {
                    warn!("pooled connection failed liveness check; reopening");
                    self.0.ops.close(conn);
                    match self.0.ops.open() {
                        Ok(fresh) => conn = fresh,
                        Err(e) => {
                            warn!(error = %e, "failed to reopen back-end connection, blocking for another handle");
                            continue;
                        }
                    }
                }
                return PooledConn {
                    pool: self.clone(),
                    conn: Some(conn),
                };
            }
            idle = self.0.not_empty.wait(idle).unwrap();
        }
    }

    fn produce(&self, conn: O::Conn) {
        let mut idle = self.0.idle.lock().unwrap();
        idle.push_back(conn);
        self.0.not_empty.notify_one();
    }

    pub fn max_conns(&self) -> usize {
        self.0.max_conns
    }

    /// Number of handles currently idle (not checked out).
    pub fn available(&self) -> usize {
        self.0.idle.lock().unwrap().len()
    }

    /// Drains and closes every idle handle. Handles currently checked out
    /// are closed as they are returned (their `PooledConn::drop` still
    /// calls `produce`, which would resurrect them; callers are expected
    /// to call `destroy` only once all `PooledConn`s have been dropped).
    pub fn destroy(&self) {
        let mut idle = self.0.idle.lock().unwrap();
        while let Some(conn) = idle.pop_front() {
            self.0.ops.close(conn);
        }
    }
}

/// RAII guard returned by [`DbPool::consume`]. Returns the handle to the
/// pool when dropped, keeping `consume`/`produce` balanced.
pub struct PooledConn<O: ConnOps> {
    pool: DbPool<O>,
    conn: Option<O::Conn>,
}

impl<O: ConnOps> Deref for PooledConn<O> {
    type Target = O::Conn;
    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("conn taken before drop")
    }
}

impl<O: ConnOps> DerefMut for PooledConn<O> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("conn taken before drop")
    }
}

impl<O: ConnOps> Drop for PooledConn<O> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.produce(conn);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingOps {
        opened: AtomicUsize,
        fail_check_once: AtomicUsize,
    }

    impl ConnOps for CountingOps {
        type Conn = usize;

        fn open(&self) -> Result<Self::Conn, DbPoolError> {
            Ok(self.opened.fetch_add(1, Ordering::SeqCst))
        }

        fn check(&self, _conn: &mut Self::Conn) -> bool {
            if self.fail_check_once.load(Ordering::SeqCst) > 0 {
                self.fail_check_once.fetch_sub(1, Ordering::SeqCst);
                false
            } else {
                true
            }
        }
    }

    #[test]
    fn pool_starts_full_and_consume_blocks_when_exhausted() {
        let ops = CountingOps {
            opened: AtomicUsize::new(0),
            fail_check_once: AtomicUsize::new(0),
        };
        let pool = DbPool::create(ops, 2).unwrap();
        assert_eq!(pool.available(), 2);
        let a = pool.consume();
        let b = pool.consume();
        assert_eq!(pool.available(), 0);
        drop(a);
        assert_eq!(pool.available(), 1);
        drop(b);
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn failed_check_transparently_reopens() {
        let ops = CountingOps {
            opened: AtomicUsize::new(0),
            fail_check_once: AtomicUsize::new(1),
        };
        let pool = DbPool::create(ops, 1).unwrap();
        let total_before = pool.0.ops.opened.load(Ordering::SeqCst);
        let _conn = pool.consume();
        let total_after = pool.0.ops.opened.load(Ordering::SeqCst);
        assert_eq!(total_after, total_before + 1, "check failure should reopen exactly once");
    }

    #[test]
    fn checked_out_never_exceeds_max_conns() {
        let ops = CountingOps {
            opened: AtomicUsize::new(0),
            fail_check_once: AtomicUsize::new(0),
        };
        let pool = DbPool::create(ops, 3).unwrap();
        let handles: Vec<_> = (0..3).map(|_| pool.consume()).collect();
        assert_eq!(pool.available(), 0);
        assert_eq!(handles.len(), 3);
    }
}
