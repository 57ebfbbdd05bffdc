//! Bounded record of past calculations.

use std::collections::VecDeque;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::ops::{serialize_number, serialize_opt_number};

/// Maximum number of retained entries.
pub const MAX_HISTORY: usize = 50;

/// One successful calculation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub timestamp: String,
    pub operation: String,
    #[serde(serialize_with = "serialize_number")]
    pub operand1: f64,
    #[serde(
        serialize_with = "serialize_opt_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub operand2: Option<f64>,
    #[serde(serialize_with = "serialize_number")]
    pub result: f64,
    pub expression: String,
}

impl HistoryEntry {
    pub fn new(
        operation: impl Into<String>,
        operand1: f64,
        operand2: Option<f64>,
        result: f64,
        expression: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            operation: operation.into(),
            operand1,
            operand2,
            result,
            expression: expression.into(),
        }
    }
}

/// Insertion-ordered store with FIFO eviction.
///
/// All mutation goes through one write lock, so concurrent appends can
/// neither lose entries nor push the store past its capacity.
pub struct HistoryStore {
    capacity: usize,
    entries: RwLock<VecDeque<HistoryEntry>>,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::with_capacity(MAX_HISTORY)
    }
}

impl HistoryStore {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            entries: RwLock::new(VecDeque::with_capacity(capacity + 1)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends `entry`, returning the evicted oldest entry on overflow.
    pub async fn append(&self, entry: HistoryEntry) -> Option<HistoryEntry> {
        let mut entries = self.entries.write().await;
        entries.push_back(entry);
        if entries.len() > self.capacity {
            entries.pop_front()
        } else {
            None
        }
    }

    pub async fn get(&self, id: &str) -> Option<HistoryEntry> {
        let entries = self.entries.read().await;
        entries.iter().find(|e| e.id == id).cloned()
    }

    /// Newest-first, at most `limit` entries.
    pub async fn list(&self, limit: usize) -> Vec<HistoryEntry> {
        let entries = self.entries.read().await;
        entries.iter().rev().take(limit).cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
