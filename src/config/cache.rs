//! Classification cache settings

use std::fmt;
use std::sync::Arc;

use super::sync::Synchronized;
use crate::cache::{CacheStore, KeyBuilder, NullStore, DEFAULT_KEY_PREFIX};
use crate::observability::EventSink;

/// Cache settings snapshot
#[derive(Clone)]
pub struct CacheSettings {
    /// Backing store; `NullStore` disables caching
    pub store: Arc<dyn CacheStore>,
    /// Namespace prepended to every key
    pub key_prefix: String,
    /// Digest of the statement text
    pub key_builder: KeyBuilder,
}

impl CacheSettings {
    /// Full cache key for a statement
    pub fn key_for(&self, statement: &str) -> String {
        let mut key = self.key_prefix.clone();
        key.push_str(&self.key_builder.build(statement));
        key
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            store: Arc::new(NullStore),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            key_builder: KeyBuilder::default(),
        }
    }
}

impl fmt::Debug for CacheSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheSettings")
            .field("store", &self.store.name())
            .field("key_prefix", &self.key_prefix)
            .finish()
    }
}

/// Cache configuration, safe to share across threads
pub struct CacheConfig {
    cell: Synchronized<CacheSettings>,
}

impl CacheConfig {
    pub(crate) fn new(events: Arc<dyn EventSink>) -> Self {
        Self {
            cell: Synchronized::new("cache", CacheSettings::default(), events),
        }
    }

    /// Current settings snapshot
    pub fn settings(&self) -> Arc<CacheSettings> {
        self.cell.load()
    }

    pub fn set_store(&self, store: Arc<dyn CacheStore>) {
        self.cell
            .update("store", |s| s.store.name(), |s| s.store = store);
    }

    pub fn key_prefix(&self) -> String {
        self.cell.load().key_prefix.clone()
    }

    pub fn set_key_prefix(&self, key_prefix: impl Into<String>) {
        let key_prefix = key_prefix.into();
        self.cell
            .update("key_prefix", |s| s.key_prefix.clone(), |s| s.key_prefix = key_prefix);
    }

    pub fn set_key_builder(&self, key_builder: KeyBuilder) {
        self.cell.update(
            "key_builder",
            |s| s.key_builder.name().to_string(),
            |s| s.key_builder = key_builder,
        );
    }

    /// Remove every key under the current prefix from the current store
    pub fn bust(&self) -> usize {
        let settings = self.cell.load();
        settings.store.delete_matched(&settings.key_prefix)
    }
}

impl fmt::Debug for CacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CacheConfig").field(&*self.cell.load()).finish()
    }
}
