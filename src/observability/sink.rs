//! Event sinks
//!
//! Routing code emits [`ProxyEvent`]s through an [`EventSink`]. The default
//! sink forwards them to `tracing`; tests install a [`MemorySink`].

use std::sync::Mutex;

use super::events::ProxyEvent;

/// Receives observable events.
///
/// Implementations must not fail or block for long: emitting happens on the
/// routing hot path and while configuration locks are held.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &ProxyEvent);
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpSink;

impl EventSink for NoOpSink {
    fn emit(&self, _: &ProxyEvent) {}
}

/// Forwards events to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &ProxyEvent) {
        match event {
            ProxyEvent::CacheMiss {
                cache_key,
                statement,
            } => {
                tracing::debug!(
                    event = event.as_str(),
                    cache_key = %cache_key,
                    statement_len = statement.len(),
                    "classification recomputed"
                );
            }
            ProxyEvent::ConfigurationUpdate {
                attribute,
                from,
                to,
                actor,
            } => {
                tracing::info!(
                    event = event.as_str(),
                    attribute = %attribute,
                    from = %from,
                    to = %to,
                    actor = %actor,
                    "configuration updated"
                );
            }
            ProxyEvent::ReplicaFallback { database, reason } => {
                tracing::warn!(
                    event = event.as_str(),
                    database = %database,
                    reason = %reason,
                    "replica unavailable, using primary"
                );
            }
            ProxyEvent::ClassificationTimeout {
                statement_len,
                pattern,
            } => {
                // The timeout strategy owns the error-level report.
                tracing::debug!(
                    event = event.as_str(),
                    statement_len = *statement_len,
                    pattern = pattern.unwrap_or("-"),
                    "classification timeout recorded"
                );
            }
        }
    }
}

/// Keeps every emitted event in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<ProxyEvent>>,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events emitted so far
    pub fn events(&self) -> Vec<ProxyEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Number of events with the given name
    pub fn count(&self, name: &str) -> usize {
        self.events
            .lock()
            .map(|events| events.iter().filter(|e| e.as_str() == name).count())
            .unwrap_or(0)
    }

    /// Drop all recorded events
    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &ProxyEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
