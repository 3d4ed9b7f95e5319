//! Observable routing events
//!
//! Events are explicit and typed. Each event has a stable uppercase name
//! so sinks can filter on it without matching on payloads.

use std::fmt;

/// Observable events emitted by the proxy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyEvent {
    /// A statement was classified because the cache had no entry for it
    CacheMiss {
        /// Full cache key, namespace prefix included
        cache_key: String,
        /// Statement that was classified
        statement: String,
    },

    /// A configuration attribute changed
    ConfigurationUpdate {
        /// Dotted attribute name, e.g. `database.primary.proxy_delay`
        attribute: String,
        /// Previous value, debug formatted
        from: String,
        /// New value, debug formatted
        to: String,
        /// Thread that performed the update
        actor: String,
    },

    /// A replica checkout failed and the primary served the statement
    ReplicaFallback {
        /// Database key of the router
        database: String,
        /// Why the replica was unusable
        reason: String,
    },

    /// Classification exceeded its budget
    ClassificationTimeout {
        /// Length of the offending statement in bytes
        statement_len: usize,
        /// Pattern being evaluated when the budget ran out
        pattern: Option<&'static str>,
    },
}

impl ProxyEvent {
    /// Returns the event name string
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyEvent::CacheMiss { .. } => "CACHE_MISS",
            ProxyEvent::ConfigurationUpdate { .. } => "CONFIGURATION_UPDATE",
            ProxyEvent::ReplicaFallback { .. } => "REPLICA_FALLBACK",
            ProxyEvent::ClassificationTimeout { .. } => "CLASSIFICATION_TIMEOUT",
        }
    }

    /// Whether the event reports a degraded routing path
    pub fn is_degraded(&self) -> bool {
        matches!(
            self,
            ProxyEvent::ReplicaFallback { .. } | ProxyEvent::ClassificationTimeout { .. }
        )
    }
}

impl fmt::Display for ProxyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_are_stable() {
        let miss = ProxyEvent::CacheMiss {
            cache_key: "arpa_abc".into(),
            statement: "SELECT 1".into(),
        };
        assert_eq!(miss.as_str(), "CACHE_MISS");
        assert_eq!(miss.to_string(), "CACHE_MISS");

        let update = ProxyEvent::ConfigurationUpdate {
            attribute: "cache.key_prefix".into(),
            from: "\"arpa_\"".into(),
            to: "\"app_\"".into(),
            actor: "main".into(),
        };
        assert_eq!(update.as_str(), "CONFIGURATION_UPDATE");
    }

    #[test]
    fn test_degraded_events() {
        let fallback = ProxyEvent::ReplicaFallback {
            database: "primary".into(),
            reason: "no database".into(),
        };
        assert!(fallback.is_degraded());

        let miss = ProxyEvent::CacheMiss {
            cache_key: "k".into(),
            statement: "SELECT 1".into(),
        };
        assert!(!miss.is_degraded());
    }
}
