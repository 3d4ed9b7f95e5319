//! # Router Errors
//!
//! Error types shared by the routing subsystems.
//!
//! Only routing-internal conditions live here. Errors raised by the database
//! driver while a statement executes are carried through [`RouteError::Database`]
//! as the driver's own value and are never rewritten.

use std::time::Duration;

use thiserror::Error;

/// Result type for routing operations
pub type RouterResult<T> = Result<T, RouterError>;

/// Pattern matching ran past its budget.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} Input too big ({statement_len}).", timed_out_label(.pattern))]
pub struct ClassificationTimeout {
    /// Length of the offending statement in bytes
    pub statement_len: usize,
    /// Name of the pattern being evaluated when the budget ran out
    pub pattern: Option<&'static str>,
    /// Time spent before giving up
    pub elapsed: Duration,
}

fn timed_out_label(pattern: &Option<&'static str>) -> String {
    match pattern {
        Some(name) => format!("{} timed out.", name),
        None => "timed out.".to_string(),
    }
}

/// Routing errors
#[derive(Debug, Clone, Error)]
pub enum RouterError {
    /// Classification exceeded its budget and the strategy chose to raise
    #[error(transparent)]
    ClassificationTimeout(#[from] ClassificationTimeout),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Replica database absent or unreachable; recovered by primary fallback
    #[error("Replica unavailable: {0}")]
    ReplicaUnavailable(String),

    /// Replica checkout failed for a reason other than unavailability
    #[error("Replica checkout failed: {0}")]
    Checkout(String),
}

impl RouterError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Returns the stable error code for this error
    pub fn code(&self) -> &'static str {
        match self {
            Self::ClassificationTimeout(_) => "PROXY_CLASSIFICATION_TIMEOUT",
            Self::Configuration(_) => "PROXY_CONFIGURATION_ERROR",
            Self::ReplicaUnavailable(_) => "PROXY_REPLICA_UNAVAILABLE",
            Self::Checkout(_) => "PROXY_CHECKOUT_FAILED",
        }
    }

    /// Whether the router absorbs this error instead of surfacing it.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::ReplicaUnavailable(_))
    }
}

/// Error returned by the router for a routed statement.
///
/// `Database` holds exactly what the driver returned.
#[derive(Debug, Error)]
pub enum RouteError<E> {
    /// Error produced by the underlying driver
    #[error(transparent)]
    Database(E),

    /// Error produced while deciding where the statement goes
    #[error(transparent)]
    Routing(#[from] RouterError),
}

impl<E> RouteError<E> {
    /// The driver error, if this is one.
    pub fn into_database(self) -> Option<E> {
        match self {
            Self::Database(e) => Some(e),
            Self::Routing(_) => None,
        }
    }

    /// The routing error, if this is one.
    pub fn as_routing(&self) -> Option<&RouterError> {
        match self {
            Self::Routing(e) => Some(e),
            Self::Database(_) => None,
        }
    }
}
