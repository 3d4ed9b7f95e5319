//! Classification Cache
//!
//! Memoizes classifier output per statement. Keys are a fixed-width digest of
//! the statement text behind a namespace prefix, so several consumers can
//! share one store and [`CachedClassifier::bust`] only clears its own keys.
//!
//! The cache is never consulted while a routing override is active; the
//! router resolves overrides before it gets here.

mod store;

pub use store::{CacheStore, MemoryStore, NullStore};

use std::fmt;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::classifier::{self, Intent};
use crate::config::ProxyConfig;
use crate::error::{ClassificationTimeout, RouterError, RouterResult};
use crate::observability::ProxyEvent;

/// Default namespace for cache keys
pub const DEFAULT_KEY_PREFIX: &str = "arpa_";

/// Builds the digest part of a cache key from statement text
#[derive(Clone)]
pub struct KeyBuilder {
    name: Arc<str>,
    build: Arc<dyn Fn(&str) -> String + Send + Sync>,
}

impl KeyBuilder {
    /// Wrap a digest function; `name` identifies it in configuration events
    pub fn new<F>(name: impl Into<Arc<str>>, build: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            build: Arc::new(build),
        }
    }

    /// SHA-256, lowercase hex
    pub fn sha256() -> Self {
        Self::new("sha256", sha256_hex)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Digest a statement
    pub fn build(&self, statement: &str) -> String {
        (self.build)(statement)
    }
}

impl Default for KeyBuilder {
    fn default() -> Self {
        Self::sha256()
    }
}

impl fmt::Debug for KeyBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("KeyBuilder").field(&self.name).finish()
    }
}

/// SHA-256 of the statement as 64 lowercase hex characters
pub fn sha256_hex(statement: &str) -> String {
    format!("{:x}", Sha256::digest(statement.as_bytes()))
}

/// Classifier backed by the configured cache store
#[derive(Debug, Clone)]
pub struct CachedClassifier {
    config: Arc<ProxyConfig>,
}

impl CachedClassifier {
    pub fn new(config: Arc<ProxyConfig>) -> Self {
        Self { config }
    }

    /// Classify through the cache.
    ///
    /// Results degraded by a tolerated timeout are returned but not stored.
    pub fn classify(&self, statement: &str) -> RouterResult<Intent> {
        let cache = self.config.cache().settings();
        let classification = self.config.classification();
        let events = self.config.events();
        let cache_key = cache.key_for(statement);

        let mut timed_out: Option<ClassificationTimeout> = None;
        let fetched = cache.store.fetch(&cache_key, &mut || {
            events.emit(&ProxyEvent::CacheMiss {
                cache_key: cache_key.clone(),
                statement: statement.to_string(),
            });
            classifier::classify(statement, &classification.budget).map_err(|timeout| {
                timed_out = Some(timeout.clone());
                RouterError::ClassificationTimeout(timeout)
            })
        });

        match (fetched, timed_out) {
            (Ok(intent), _) => Ok(intent),
            (Err(_), Some(timeout)) => {
                events.emit(&ProxyEvent::ClassificationTimeout {
                    statement_len: timeout.statement_len,
                    pattern: timeout.pattern,
                });
                classification.strategy.handle(&timeout)?;
                Ok(Intent::ForcePrimary)
            }
            (Err(e), None) => Err(e),
        }
    }

    /// Write detection; never cached.
    pub fn is_write(&self, statement: &str) -> RouterResult<bool> {
        let classification = self.config.classification();
        classifier::is_write_with_strategy(
            statement,
            &classification.budget,
            &classification.strategy,
            self.config.events().as_ref(),
        )
    }

    /// Full cache key for a statement
    pub fn cache_key_for(&self, statement: &str) -> String {
        self.config.cache().settings().key_for(statement)
    }

    /// Drop every cached classification under the configured prefix
    pub fn bust(&self) -> usize {
        self.config.cache().bust()
    }
}
