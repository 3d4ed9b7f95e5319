//! Connection Router
//!
//! Per statement: resolve overrides, classify, pick roles, then for each
//! role acquire a session, execute, and release it.
//!
//! - An open transaction on the primary keeps every statement there
//! - A role pinned with [`connected_to`](crate::context::ambient::connected_to)
//!   wins over classification
//! - A write recorded less than `proxy_delay` ago keeps reads on the primary
//! - An unavailable replica is replaced by the primary
//! - Driver errors are returned as they are

mod connection;
mod lease;
mod routing;

pub use connection::{
    CheckoutError, DatabaseConnection, ReplicaPool, StatementExecutor, TransactionDepth,
};
pub use routing::ConnectionRouter;
