//! Routing Configuration
//!
//! [`ProxyConfig`] is built once by the process's composition root and
//! handed to routers and propagators as an `Arc`. There is no global
//! instance.
//!
//! - Every aggregate (the proxy itself, each database, the cache) serializes
//!   its setters behind one mutex
//! - Every setter emits `CONFIGURATION_UPDATE` with old and new values
//! - Reads load the last published snapshot and never block

mod cache;
mod database;
mod settings;
mod sync;

pub use cache::{CacheConfig, CacheSettings};
pub use database::{DatabaseConfig, DatabaseSettings, CHECKOUT_TIMEOUT, PROXY_DELAY};
pub use settings::{
    CacheFileSettings, CacheStoreKind, DatabaseFileSettings, PropagationFileSettings,
    ProxySettings,
};

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use sync::Synchronized;

use crate::classifier::{ClassificationBudget, TimeoutStrategy};
use crate::error::RouterResult;
use crate::observability::{EventSink, TracingSink};

/// Database used by the convenience accessors
pub const DEFAULT_DATABASE_NAME: &str = "primary";

/// Classification settings snapshot
#[derive(Debug, Clone, Default)]
pub struct ClassificationSettings {
    pub strategy: TimeoutStrategy,
    pub budget: ClassificationBudget,
}

/// Process-wide routing configuration
pub struct ProxyConfig {
    classification: Synchronized<ClassificationSettings>,
    databases: Synchronized<BTreeMap<String, Arc<DatabaseConfig>>>,
    cache: CacheConfig,
    events: Arc<dyn EventSink>,
}

impl ProxyConfig {
    /// Defaults, with events forwarded to `tracing`
    pub fn new() -> Self {
        Self::with_event_sink(Arc::new(TracingSink))
    }

    /// Defaults, with events sent to `events`
    pub fn with_event_sink(events: Arc<dyn EventSink>) -> Self {
        Self {
            classification: Synchronized::new(
                "",
                ClassificationSettings::default(),
                events.clone(),
            ),
            databases: Synchronized::new("", BTreeMap::new(), events.clone()),
            cache: CacheConfig::new(events.clone()),
            events,
        }
    }

    /// Sink receiving routing and configuration events
    pub fn events(&self) -> Arc<dyn EventSink> {
        self.events.clone()
    }

    /// Settings for `name`, created with defaults on first use.
    ///
    /// The returned handle stays valid for the life of the config.
    pub fn database(&self, name: &str) -> Arc<DatabaseConfig> {
        if let Some(existing) = self.databases.load().get(name) {
            return existing.clone();
        }

        let created = Arc::new(DatabaseConfig::new(name, self.events.clone()));
        let mut resolved = created.clone();
        self.databases.update(
            "databases",
            |map| map.keys().cloned().collect::<Vec<_>>(),
            |map| {
                resolved = map.entry(name.to_string()).or_insert(created).clone();
            },
        );
        resolved
    }

    /// Names of all configured databases
    pub fn database_names(&self) -> Vec<String> {
        self.databases.load().keys().cloned().collect()
    }

    /// Proxy delay for `name`, without registering unknown names
    pub fn proxy_delay_for(&self, name: &str) -> Duration {
        self.databases
            .load()
            .get(name)
            .map(|db| db.proxy_delay())
            .unwrap_or(PROXY_DELAY)
    }

    fn default_database(&self) -> Arc<DatabaseConfig> {
        self.database(DEFAULT_DATABASE_NAME)
    }

    /// Proxy delay of the default database
    pub fn proxy_delay(&self) -> Duration {
        self.default_database().proxy_delay()
    }

    pub fn set_proxy_delay(&self, proxy_delay: Duration) {
        self.default_database().set_proxy_delay(proxy_delay);
    }

    /// Checkout timeout of the default database
    pub fn checkout_timeout(&self) -> Duration {
        self.default_database().checkout_timeout()
    }

    pub fn set_checkout_timeout(&self, checkout_timeout: Duration) {
        self.default_database().set_checkout_timeout(checkout_timeout);
    }

    /// Classification settings snapshot
    pub fn classification(&self) -> Arc<ClassificationSettings> {
        self.classification.load()
    }

    pub fn timeout_strategy(&self) -> TimeoutStrategy {
        self.classification.load().strategy.clone()
    }

    pub fn set_timeout_strategy(&self, strategy: TimeoutStrategy) {
        self.classification.update(
            "regexp_timeout_strategy",
            |s| s.strategy.name(),
            |s| s.strategy = strategy,
        );
    }

    /// Select a built-in strategy by name; unknown names are rejected.
    pub fn set_timeout_strategy_named(&self, name: &str) -> RouterResult<()> {
        let strategy = TimeoutStrategy::from_name(name)?;
        self.set_timeout_strategy(strategy);
        Ok(())
    }

    pub fn budget(&self) -> ClassificationBudget {
        self.classification.load().budget
    }

    pub fn set_budget(&self, budget: ClassificationBudget) {
        self.classification
            .update("classification_budget", |s| s.budget, |s| s.budget = budget);
    }

    /// Cache configuration
    pub fn cache(&self) -> &CacheConfig {
        &self.cache
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("classification", &*self.classification.load())
            .field("databases", &self.database_names())
            .field("cache", &self.cache)
            .finish()
    }
}
