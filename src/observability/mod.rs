//! Observability for the routing proxy
//!
//! This module provides:
//! - Typed routing events ([`ProxyEvent`])
//! - Pluggable event sinks ([`EventSink`])
//! - Logging setup for the binary
//!
//! # Principles
//!
//! 1. Observability is read-only
//! 2. Emitting an event never changes a routing decision
//! 3. Sinks never fail the caller

mod events;
mod sink;

pub use events::ProxyEvent;
pub use sink::{EventSink, MemorySink, NoOpSink, TracingSink};

use tracing_subscriber::EnvFilter;

/// Install a `tracing` fmt subscriber.
///
/// `RUST_LOG` wins over `default_filter` when set. Calling this more than once
/// is harmless; later calls leave the first subscriber in place.
pub fn init_logging(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_twice() {
        init_logging("warn");
        init_logging("debug");
    }
}
