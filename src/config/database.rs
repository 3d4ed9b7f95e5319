//! Per-database routing settings

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::sync::Synchronized;
use crate::observability::EventSink;

/// How long reads stay on the primary after a write
pub const PROXY_DELAY: Duration = Duration::from_secs(2);

/// How long to wait for a replica connection
pub const CHECKOUT_TIMEOUT: Duration = Duration::from_secs(2);

/// Settings snapshot for one database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    pub proxy_delay: Duration,
    pub checkout_timeout: Duration,
    /// Label attached to log lines for this database; defaults to its name
    pub name_prefix: Option<String>,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            proxy_delay: PROXY_DELAY,
            checkout_timeout: CHECKOUT_TIMEOUT,
            name_prefix: None,
        }
    }
}

/// Routing settings for one database, safe to share across threads
pub struct DatabaseConfig {
    name: String,
    cell: Synchronized<DatabaseSettings>,
}

impl DatabaseConfig {
    pub(crate) fn new(name: &str, events: Arc<dyn EventSink>) -> Self {
        Self {
            name: name.to_string(),
            cell: Synchronized::new(format!("database.{}", name), DatabaseSettings::default(), events),
        }
    }

    /// Database name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current settings snapshot
    pub fn settings(&self) -> Arc<DatabaseSettings> {
        self.cell.load()
    }

    pub fn proxy_delay(&self) -> Duration {
        self.cell.load().proxy_delay
    }

    pub fn set_proxy_delay(&self, proxy_delay: Duration) {
        self.cell
            .update("proxy_delay", |s| s.proxy_delay, |s| s.proxy_delay = proxy_delay);
    }

    pub fn checkout_timeout(&self) -> Duration {
        self.cell.load().checkout_timeout
    }

    pub fn set_checkout_timeout(&self, checkout_timeout: Duration) {
        self.cell.update(
            "checkout_timeout",
            |s| s.checkout_timeout,
            |s| s.checkout_timeout = checkout_timeout,
        );
    }

    /// Log label, falling back to the database name
    pub fn name_prefix(&self) -> String {
        self.cell
            .load()
            .name_prefix
            .clone()
            .unwrap_or_else(|| self.name.clone())
    }

    pub fn set_name_prefix(&self, prefix: impl Into<String>) {
        let prefix = prefix.into();
        self.cell.update(
            "name_prefix",
            |s| s.name_prefix.clone(),
            |s| s.name_prefix = Some(prefix),
        );
    }
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("name", &self.name)
            .field("settings", &*self.cell.load())
            .finish()
    }
}
