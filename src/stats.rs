use std::collections::HashMap;

use dashmap::DashMap;
use serde::Serialize;

/// Counter sink the scraping pipeline exposes for run-level metrics.
pub trait StatsSink: Send + Sync {
    fn set_value(&self, key: &str, value: i64);
    fn inc_value(&self, key: &str);
}

/// In-memory sink for tests and embeddings without a host pipeline.
#[derive(Debug, Default)]
pub struct MemoryStats {
    values: DashMap<String, i64>,
}

impl MemoryStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<i64> {
        self.values.get(key).map(|v| *v)
    }

    pub fn snapshot(&self) -> HashMap<String, i64> {
        self.values
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }
}

impl StatsSink for MemoryStats {
    fn set_value(&self, key: &str, value: i64) {
        self.values.insert(key.to_string(), value);
    }

    fn inc_value(&self, key: &str) {
        *self.values.entry(key.to_string()).or_insert(0) += 1;
    }
}

/// One row of the close-of-run session table.
#[derive(Debug, Clone, Serialize)]
pub struct SessionDetail {
    pub id: String,
    pub requests: u32,
    pub success_rate: f64,
    pub created_minutes_ago: f64,
}

/// Aggregate proxy statistics emitted when the spider closes.
#[derive(Debug, Clone, Serialize)]
pub struct ProxyStats {
    pub enabled: bool,
    pub active_sessions: usize,
    pub total_sessions: usize,
    pub blacklisted_sessions: usize,
    pub max_sessions: usize,
    pub rotation_interval: u32,
    pub requests_since_rotation: u64,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub overall_success_rate: f64,
    pub session_details: Vec<SessionDetail>,
}

impl ProxyStats {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Mirror every scalar into the sink under the `brightdata/` prefix.
    pub fn mirror_into(&self, sink: &dyn StatsSink) {
        sink.set_value("brightdata/enabled", self.enabled as i64);
        sink.set_value("brightdata/active_sessions", self.active_sessions as i64);
        sink.set_value("brightdata/total_sessions", self.total_sessions as i64);
        sink.set_value(
            "brightdata/blacklisted_sessions",
            self.blacklisted_sessions as i64,
        );
        sink.set_value("brightdata/max_sessions", self.max_sessions as i64);
        sink.set_value("brightdata/rotation_interval", self.rotation_interval as i64);
        sink.set_value(
            "brightdata/requests_since_rotation",
            self.requests_since_rotation as i64,
        );
        sink.set_value("brightdata/total_requests", self.total_requests as i64);
        sink.set_value(
            "brightdata/successful_requests",
            self.successful_requests as i64,
        );
        sink.set_value("brightdata/failed_requests", self.failed_requests as i64);
        sink.set_value(
            "brightdata/overall_success_rate",
            self.overall_success_rate.round() as i64,
        );
    }
}
