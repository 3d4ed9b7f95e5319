//! Driver seams
//!
//! The router never talks to a database driver directly. Drivers plug in by
//! implementing these traits.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::error::RouterError;

/// A live database session
pub trait DatabaseConnection: Send {
    /// The driver's own error type, returned to callers untouched
    type Error: std::error::Error + Send + Sync + 'static;

    /// Finish deferred connection setup.
    ///
    /// Called once, before the first statement runs on the primary.
    fn verify(&mut self) -> Result<(), Self::Error>;

    /// Handle on this session's open transaction depth.
    ///
    /// The router takes it once, when the session is handed over, and reads
    /// it without waiting for a running statement. The driver must keep it
    /// current as transactions open and close.
    fn transaction_depth(&self) -> TransactionDepth;
}

/// Shared open-transaction counter of one session
#[derive(Debug, Clone, Default)]
pub struct TransactionDepth(Arc<AtomicUsize>);

impl TransactionDepth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    pub fn set(&self, depth: usize) {
        self.0.store(depth, Ordering::Release);
    }

    /// Record `BEGIN` / `SAVEPOINT`; returns the new depth
    pub fn enter(&self) -> usize {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Record `COMMIT` / `ROLLBACK`; never goes below zero
    pub fn exit(&self) -> usize {
        let previous = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |depth| {
                Some(depth.saturating_sub(1))
            })
            .unwrap_or(0);
        previous.saturating_sub(1)
    }

    pub fn is_open(&self) -> bool {
        self.get() > 0
    }
}

/// Pool of replica sessions
pub trait ReplicaPool: Send + Sync {
    type Connection: DatabaseConnection;

    /// Wait up to `timeout` for a session
    fn checkout(&self, timeout: Duration) -> Result<Self::Connection, CheckoutError>;

    /// Return a session taken with [`checkout`](Self::checkout)
    fn checkin(&self, connection: Self::Connection);
}

/// Statement operations the router proxies, one method per driver call
pub trait StatementExecutor: DatabaseConnection {
    /// Native result of a statement
    type Output;

    fn execute(&mut self, sql: &str) -> Result<Self::Output, Self::Error>;

    fn exec_query(&mut self, sql: &str, binds: &[Value]) -> Result<Self::Output, Self::Error>;
}

/// Replica checkout failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckoutError {
    /// Replica database does not exist (yet)
    #[error("database does not exist: {0}")]
    NoDatabase(String),

    /// Replica could not be reached
    #[error("connection not established: {0}")]
    ConnectionNotEstablished(String),

    /// No session became available in time
    #[error("checkout timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Other(String),
}

impl CheckoutError {
    /// Whether the primary should serve the statement instead
    pub fn is_unavailable(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl From<CheckoutError> for RouterError {
    fn from(err: CheckoutError) -> Self {
        if err.is_unavailable() {
            RouterError::ReplicaUnavailable(err.to_string())
        } else {
            RouterError::Checkout(err.to_string())
        }
    }
}
