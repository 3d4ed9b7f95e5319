//! replica-proxy - per-statement primary/replica routing
//!
//! Decides for every SQL statement whether it runs on the writable primary
//! or on a read replica, and keeps a client on the primary for a short
//! window after its own writes so it never reads data older than what it
//! wrote.

pub mod cache;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod observability;
pub mod propagation;
pub mod router;

pub use classifier::{Intent, Role, RoutingDecision};
pub use config::ProxyConfig;
pub use context::ConsistencyWindow;
pub use error::{RouteError, RouterError, RouterResult};
pub use router::ConnectionRouter;
