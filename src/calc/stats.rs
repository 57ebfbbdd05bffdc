use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

/// Process-wide counters read by the `math://stats` resource.
pub struct Stats {
    started_at: DateTime<Utc>,
    started: Instant,
    request_count: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub request_count: u64,
    pub started_at: String,
    pub uptime_seconds: u64,
    pub history_size: usize,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            started: Instant::now(),
            request_count: AtomicU64::new(0),
        }
    }

    /// Counts one dispatched request; returns the new total.
    pub fn record_request(&self) -> u64 {
        self.request_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn snapshot(&self, history_size: usize) -> StatsSnapshot {
        StatsSnapshot {
            request_count: self.request_count(),
            started_at: self.started_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            uptime_seconds: self.uptime().as_secs(),
            history_size,
        }
    }
}
