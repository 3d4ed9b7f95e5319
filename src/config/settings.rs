//! Settings file
//!
//! JSON document describing a [`ProxyConfig`]. Every field is optional; a
//! missing field keeps the default.
//!
//! ```json
//! {
//!   "regexp_timeout_strategy": "log",
//!   "classification_time_limit_ms": 1000,
//!   "cache": { "store": "memory", "key_prefix": "arpa_", "max_entries": 10000 },
//!   "databases": { "primary": { "proxy_delay_ms": 2000, "checkout_timeout_ms": 2000 } },
//!   "propagation": { "asset_prefix": "/assets" }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ProxyConfig;
use crate::cache::{MemoryStore, NullStore, DEFAULT_KEY_PREFIX};
use crate::classifier::{ClassificationBudget, TimeoutStrategy};
use crate::error::{RouterError, RouterResult};
use crate::propagation::{CookieOptions, PropagationOptions, COOKIE_BUFFER, COOKIE_NAME};

/// Settings file root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProxySettings {
    /// `"log"` or `"raise"`
    #[serde(default = "default_strategy")]
    pub regexp_timeout_strategy: String,

    #[serde(default = "default_time_limit_ms")]
    pub classification_time_limit_ms: u64,

    #[serde(default)]
    pub max_statement_bytes: Option<usize>,

    #[serde(default)]
    pub cache: CacheFileSettings,

    #[serde(default)]
    pub databases: BTreeMap<String, DatabaseFileSettings>,

    #[serde(default)]
    pub propagation: PropagationFileSettings,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            regexp_timeout_strategy: default_strategy(),
            classification_time_limit_ms: default_time_limit_ms(),
            max_statement_bytes: None,
            cache: CacheFileSettings::default(),
            databases: BTreeMap::new(),
            propagation: PropagationFileSettings::default(),
        }
    }
}

fn default_strategy() -> String {
    "log".to_string()
}

fn default_time_limit_ms() -> u64 {
    1000
}

/// Cache store kinds a settings file can select
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStoreKind {
    #[default]
    Null,
    Memory,
}

/// Cache section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheFileSettings {
    #[serde(default)]
    pub store: CacheStoreKind,

    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Bound for the memory store
    #[serde(default)]
    pub max_entries: Option<usize>,
}

fn default_key_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}

impl Default for CacheFileSettings {
    fn default() -> Self {
        Self {
            store: CacheStoreKind::default(),
            key_prefix: default_key_prefix(),
            max_entries: None,
        }
    }
}

/// One database section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseFileSettings {
    #[serde(default)]
    pub proxy_delay_ms: Option<u64>,

    #[serde(default)]
    pub checkout_timeout_ms: Option<u64>,

    #[serde(default)]
    pub name_prefix: Option<String>,
}

/// Request propagation section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PropagationFileSettings {
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    #[serde(default = "default_cookie_buffer_ms")]
    pub cookie_buffer_ms: u64,

    #[serde(default = "default_cookie_path")]
    pub cookie_path: String,

    #[serde(default = "default_true")]
    pub http_only: bool,

    #[serde(default)]
    pub secure: bool,

    #[serde(default)]
    pub same_site: Option<String>,

    /// Requests under this path prefix skip propagation
    #[serde(default)]
    pub asset_prefix: Option<String>,

    /// Secret for signing tokens; unsigned when absent
    #[serde(default)]
    pub signing_secret: Option<String>,
}

fn default_cookie_name() -> String {
    COOKIE_NAME.to_string()
}

fn default_cookie_buffer_ms() -> u64 {
    COOKIE_BUFFER.as_millis() as u64
}

fn default_cookie_path() -> String {
    "/".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for PropagationFileSettings {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            cookie_buffer_ms: default_cookie_buffer_ms(),
            cookie_path: default_cookie_path(),
            http_only: true,
            secure: false,
            same_site: None,
            asset_prefix: None,
            signing_secret: None,
        }
    }
}

impl PropagationFileSettings {
    /// Propagation options described by this section
    pub fn to_options(&self) -> PropagationOptions {
        PropagationOptions {
            cookie: CookieOptions {
                name: self.cookie_name.clone(),
                path: self.cookie_path.clone(),
                http_only: self.http_only,
                secure: self.secure,
                same_site: self.same_site.clone(),
            },
            buffer: Duration::from_millis(self.cookie_buffer_ms),
            asset_prefix: self.asset_prefix.clone(),
            signing_secret: self.signing_secret.as_ref().map(|s| s.as_bytes().to_vec()),
        }
    }
}

impl ProxySettings {
    /// Parse a settings document
    pub fn from_json_str(json: &str) -> RouterResult<Self> {
        let settings: Self = serde_json::from_str(json)
            .map_err(|e| RouterError::configuration(format!("invalid settings: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read and parse a settings file
    pub fn from_file(path: impl AsRef<Path>) -> RouterResult<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            RouterError::configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&contents)
    }

    /// Reject values that cannot be applied
    pub fn validate(&self) -> RouterResult<()> {
        TimeoutStrategy::from_name(&self.regexp_timeout_strategy)?;

        if self.cache.key_prefix.is_empty() {
            return Err(RouterError::configuration(
                "cache.key_prefix must not be empty",
            ));
        }
        if self.cache.max_entries == Some(0) {
            return Err(RouterError::configuration(
                "cache.max_entries must be positive",
            ));
        }
        if self.propagation.cookie_name.is_empty() {
            return Err(RouterError::configuration(
                "propagation.cookie_name must not be empty",
            ));
        }
        if let Some(same_site) = &self.propagation.same_site {
            if !matches!(same_site.as_str(), "Strict" | "Lax" | "None") {
                return Err(RouterError::configuration(format!(
                    "propagation.same_site must be Strict, Lax or None, got {:?}",
                    same_site
                )));
            }
        }
        Ok(())
    }

    /// Classification budget described by this document
    pub fn budget(&self) -> ClassificationBudget {
        ClassificationBudget {
            time_limit: Duration::from_millis(self.classification_time_limit_ms),
            max_statement_bytes: self.max_statement_bytes,
        }
    }

    /// Push every setting into `config` through its synchronized setters
    pub fn apply(&self, config: &ProxyConfig) -> RouterResult<()> {
        self.validate()?;

        config.set_timeout_strategy_named(&self.regexp_timeout_strategy)?;
        config.set_budget(self.budget());

        let cache = config.cache();
        match (self.cache.store, self.cache.max_entries) {
            (CacheStoreKind::Null, _) => cache.set_store(Arc::new(NullStore)),
            (CacheStoreKind::Memory, Some(max)) => cache.set_store(Arc::new(MemoryStore::bounded(max))),
            (CacheStoreKind::Memory, None) => cache.set_store(Arc::new(MemoryStore::new())),
        }
        cache.set_key_prefix(self.cache.key_prefix.clone());

        for (name, db) in &self.databases {
            let database = config.database(name);
            if let Some(ms) = db.proxy_delay_ms {
                database.set_proxy_delay(Duration::from_millis(ms));
            }
            if let Some(ms) = db.checkout_timeout_ms {
                database.set_checkout_timeout(Duration::from_millis(ms));
            }
            if let Some(prefix) = &db.name_prefix {
                database.set_name_prefix(prefix.clone());
            }
        }
        Ok(())
    }
}
