use super::history::HistoryStore;
use super::stats::Stats;

/// Shared mutable state injected into every handler.
///
/// Tests build one per case, so nothing leaks between them.
#[derive(Default)]
pub struct ServerState {
    pub history: HistoryStore,
    pub stats: Stats,
}

impl ServerState {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::history::{HistoryEntry, MAX_HISTORY};

    #[tokio::test]
    async fn test_instances_are_isolated() {
        let a = ServerState::new();
        let b = ServerState::new();
        a.history
            .append(HistoryEntry::new("add", 1.0, Some(1.0), 2.0, "1 + 1"))
            .await;
        a.stats.record_request();

        assert_eq!(a.history.len().await, 1);
        assert!(b.history.is_empty().await);
        assert_eq!(b.stats.request_count(), 0);
        assert_eq!(b.history.capacity(), MAX_HISTORY);
    }
}
