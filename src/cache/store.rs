//! Cache stores
//!
//! Any store with read/write/delete-by-prefix semantics can back the
//! classification cache. Eviction is the store's own business.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::RwLock;

use crate::classifier::Intent;
use crate::error::RouterResult;

/// Backing store for cached classifications
pub trait CacheStore: Send + Sync {
    /// Look up a key
    fn read(&self, key: &str) -> Option<Intent>;

    /// Store a value
    fn write(&self, key: &str, intent: Intent);

    /// Remove every key starting with `prefix`, returning how many went
    fn delete_matched(&self, prefix: &str) -> usize;

    /// Return the cached value, or compute, store and return it.
    ///
    /// A failed computation stores nothing.
    fn fetch(
        &self,
        key: &str,
        compute: &mut dyn FnMut() -> RouterResult<Intent>,
    ) -> RouterResult<Intent> {
        if let Some(intent) = self.read(key) {
            return Ok(intent);
        }
        let intent = compute()?;
        self.write(key, intent);
        Ok(intent)
    }

    /// Store name for diagnostics
    fn name(&self) -> &'static str;
}

/// Stores nothing; every fetch recomputes
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStore;

impl CacheStore for NullStore {
    fn read(&self, _: &str) -> Option<Intent> {
        None
    }

    fn write(&self, _: &str, _: Intent) {}

    fn delete_matched(&self, _: &str) -> usize {
        0
    }

    fn name(&self) -> &'static str {
        "null"
    }
}

#[derive(Default)]
struct MemoryEntries {
    values: HashMap<String, Intent>,
    insertion_order: VecDeque<String>,
}

/// In-process store, optionally bounded.
///
/// When full, the oldest inserted key is evicted first.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<MemoryEntries>,
    max_entries: Option<usize>,
}

impl MemoryStore {
    /// Unbounded store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store holding at most `max_entries` keys
    pub fn bounded(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(MemoryEntries::default()),
            max_entries: Some(max_entries.max(1)),
        }
    }

    /// Number of cached keys
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.values.len()).unwrap_or(0)
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStore for MemoryStore {
    fn read(&self, key: &str) -> Option<Intent> {
        self.entries.read().ok()?.values.get(key).copied()
    }

    fn write(&self, key: &str, intent: Intent) {
        let Ok(mut entries) = self.entries.write() else {
            return;
        };
        if entries.values.insert(key.to_string(), intent).is_some() {
            return;
        }
        entries.insertion_order.push_back(key.to_string());

        if let Some(max) = self.max_entries {
            while entries.values.len() > max {
                match entries.insertion_order.pop_front() {
                    Some(oldest) => {
                        entries.values.remove(&oldest);
                    }
                    None => break,
                }
            }
        }
    }

    fn delete_matched(&self, prefix: &str) -> usize {
        let Ok(mut entries) = self.entries.write() else {
            return 0;
        };
        let before = entries.values.len();
        entries.values.retain(|key, _| !key.starts_with(prefix));
        entries.insertion_order.retain(|key| !key.starts_with(prefix));
        before - entries.values.len()
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("len", &self.len())
            .field("max_entries", &self.max_entries)
            .finish()
    }
}
