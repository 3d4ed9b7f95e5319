//! Per-unit-of-work write bookkeeping

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Last observed write per database key, in UTC epoch seconds.
///
/// Holds no connections and performs no I/O. Timestamps never move
/// backwards for a key; a missing key reads as 0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConsistencyWindow {
    last_write: BTreeMap<String, f64>,
}

impl ConsistencyWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a write to `db_key` at `now`
    pub fn record_write(&mut self, db_key: &str, now: f64) {
        let entry = self.last_write.entry(db_key.to_string()).or_insert(now);
        if now > *entry {
            *entry = now;
        }
    }

    /// Whether a write to `db_key` happened less than `proxy_delay` ago
    pub fn recent_write_to(&self, db_key: &str, proxy_delay: Duration, now: f64) -> bool {
        now - self.last_write(db_key) < proxy_delay.as_secs_f64()
    }

    /// Timestamp of the last write to `db_key`, 0 when none is known
    pub fn last_write(&self, db_key: &str) -> f64 {
        self.last_write.get(db_key).copied().unwrap_or(0.0)
    }

    /// Latest write across all keys
    pub fn latest(&self) -> Option<f64> {
        self.last_write.values().copied().reduce(f64::max)
    }

    pub fn is_empty(&self) -> bool {
        self.last_write.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.last_write.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Export the full timestamp map
    pub fn to_map(&self) -> BTreeMap<String, f64> {
        self.last_write.clone()
    }

    /// Rebuild from an exported map. Non-finite timestamps are dropped.
    pub fn from_map(map: BTreeMap<String, f64>) -> Self {
        Self {
            last_write: map.into_iter().filter(|(_, ts)| ts.is_finite()).collect(),
        }
    }

    /// Fold another window in, keeping the later timestamp per key
    pub fn merge(&mut self, other: &ConsistencyWindow) {
        for (key, ts) in other.iter() {
            self.record_write(key, ts);
        }
    }
}
