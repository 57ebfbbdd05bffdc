//! Read-only `math://` resources.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use super::registry::{Registry, Resource, ResourceContents, ResourceDescriptor, ResourceHandler};
use super::uri_template::TemplateVars;
use crate::calc::ops::MAX_SAFE_INTEGER;
use crate::calc::{ServerState, MAX_HISTORY};
use crate::{Error, Result};

pub const STATS_URI: &str = "math://stats";
pub const HISTORY_URI: &str = "math://history";
pub const CONSTANTS_URI: &str = "math://constants";
pub const HISTORY_ENTRY_TEMPLATE: &str = "math://history/{id}";

pub struct StatsResource {
    state: Arc<ServerState>,
}

#[async_trait]
impl ResourceHandler for StatsResource {
    async fn read(&self, uri: &str, _vars: &TemplateVars) -> Result<ResourceContents> {
        let history_size = self.state.history.len().await;
        let snapshot = self.state.stats.snapshot(history_size);
        ResourceContents::json(uri, &serde_json::to_value(snapshot)?)
    }
}

pub struct HistoryResource {
    state: Arc<ServerState>,
}

#[async_trait]
impl ResourceHandler for HistoryResource {
    async fn read(&self, uri: &str, _vars: &TemplateVars) -> Result<ResourceContents> {
        let entries = self.state.history.list(MAX_HISTORY).await;
        ResourceContents::json(
            uri,
            &json!({
                "count": entries.len(),
                "capacity": self.state.history.capacity(),
                "entries": entries,
            }),
        )
    }
}

pub struct ConstantsResource;

#[async_trait]
impl ResourceHandler for ConstantsResource {
    async fn read(&self, uri: &str, _vars: &TemplateVars) -> Result<ResourceContents> {
        use std::f64::consts;
        ResourceContents::json(
            uri,
            &json!({
                "pi": consts::PI,
                "e": consts::E,
                "tau": consts::TAU,
                "sqrt2": consts::SQRT_2,
                "ln2": consts::LN_2,
                "ln10": consts::LN_10,
                "phi": (1.0 + 5f64.sqrt()) / 2.0,
                "maxSafeInteger": MAX_SAFE_INTEGER as i64,
            }),
        )
    }
}

/// `math://history/{id}`: one entry per address.
pub struct HistoryEntryResource {
    state: Arc<ServerState>,
}

#[async_trait]
impl ResourceHandler for HistoryEntryResource {
    async fn read(&self, uri: &str, vars: &TemplateVars) -> Result<ResourceContents> {
        let id = vars
            .get("id")
            .ok_or_else(|| Error::Internal(format!("template matched {uri} without an id")))?;
        let entry = self
            .state
            .history
            .get(id)
            .await
            .ok_or_else(|| Error::ResourceNotFound(uri.to_string()))?;
        ResourceContents::json(uri, &serde_json::to_value(entry)?)
    }

    async fn list(&self) -> Vec<Resource> {
        self.state
            .history
            .list(MAX_HISTORY)
            .await
            .into_iter()
            .map(|entry| Resource {
                uri: format!("{HISTORY_URI}/{}", entry.id),
                name: entry.expression,
                description: Some(format!("{} at {}", entry.operation, entry.timestamp)),
                mime_type: Some("application/json".to_string()),
            })
            .collect()
    }

    async fn complete(&self, placeholder: &str, prefix: &str) -> Vec<String> {
        if placeholder != "id" {
            return Vec::new();
        }
        self.state
            .history
            .list(MAX_HISTORY)
            .await
            .into_iter()
            .map(|entry| entry.id)
            .filter(|id| id.starts_with(prefix))
            .collect()
    }
}

pub fn register_all(registry: &mut Registry, state: &Arc<ServerState>) -> Result<()> {
    registry.register(ResourceDescriptor::literal(
        STATS_URI,
        "Server statistics",
        "Request count, start time, uptime and history size",
        Arc::new(StatsResource {
            state: Arc::clone(state),
        }),
    ))?;
    registry.register(ResourceDescriptor::literal(
        HISTORY_URI,
        "Calculation history",
        "The most recent calculations, newest first",
        Arc::new(HistoryResource {
            state: Arc::clone(state),
        }),
    ))?;
    registry.register(ResourceDescriptor::literal(
        CONSTANTS_URI,
        "Mathematical constants",
        "Common constants such as pi and e",
        Arc::new(ConstantsResource),
    ))?;
    registry.register(ResourceDescriptor::template(
        HISTORY_ENTRY_TEMPLATE,
        "Calculation",
        "A single calculation by id",
        Arc::new(HistoryEntryResource {
            state: Arc::clone(state),
        }),
    )?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::HistoryEntry;
    use assert_matches::assert_matches;
    use serde_json::Value;

    async fn registry_with_history(n: usize) -> (Registry, Arc<ServerState>) {
        let state = Arc::new(ServerState::new());
        for i in 0..n {
            state
                .history
                .append(HistoryEntry::new("add", i as f64, Some(1.0), i as f64 + 1.0, format!("{i} + 1")))
                .await;
        }
        let mut registry = Registry::new();
        register_all(&mut registry, &state).unwrap();
        (registry, state)
    }

    async fn read(registry: &Registry, uri: &str) -> Result<Value> {
        let (resource, vars) = registry.resolve_address(uri)?;
        let contents = resource.handler.read(uri, &vars).await?;
        assert_eq!(contents.mime_type, "application/json");
        Ok(serde_json::from_str(&contents.text)?)
    }

    #[tokio::test]
    async fn test_list_is_literals_then_history_newest_first() {
        let (registry, state) = registry_with_history(3).await;
        let uris: Vec<_> = registry.list_addressable().await.into_iter().map(|r| r.uri).collect();

        let newest = state.history.list(3).await;
        assert_eq!(
            uris,
            vec![
                STATS_URI.to_string(),
                HISTORY_URI.to_string(),
                CONSTANTS_URI.to_string(),
                format!("math://history/{}", newest[0].id),
                format!("math://history/{}", newest[1].id),
                format!("math://history/{}", newest[2].id),
            ]
        );
        let again: Vec<_> = registry.list_addressable().await.into_iter().map(|r| r.uri).collect();
        assert_eq!(uris, again);
    }

    #[tokio::test]
    async fn test_read_entry_and_unknown_id() {
        let (registry, state) = registry_with_history(1).await;
        let entry = state.history.list(1).await.remove(0);

        let value = read(&registry, &format!("math://history/{}", entry.id)).await.unwrap();
        assert_eq!(value["id"], entry.id);
        assert_eq!(value["result"], 1);

        assert_matches!(
            read(&registry, "math://history/does-not-exist").await,
            Err(Error::ResourceNotFound(_))
        );
    }

    #[tokio::test]
    async fn test_stats_and_history_contents() {
        let (registry, state) = registry_with_history(2).await;
        state.stats.record_request();

        let stats = read(&registry, STATS_URI).await.unwrap();
        assert_eq!(stats["requestCount"], 1);
        assert_eq!(stats["historySize"], 2);

        let history = read(&registry, HISTORY_URI).await.unwrap();
        assert_eq!(history["count"], 2);
        assert_eq!(history["capacity"], 50);

        let constants = read(&registry, CONSTANTS_URI).await.unwrap();
        assert_eq!(constants["maxSafeInteger"], 9_007_199_254_740_991_i64);
    }

    #[tokio::test]
    async fn test_id_completion() {
        let (registry, state) = registry_with_history(2).await;
        let template = registry.resource_template(HISTORY_ENTRY_TEMPLATE).unwrap();
        let first = state.history.list(2).await[0].id.clone();

        let all = template.handler.complete("id", "").await;
        assert_eq!(all.len(), 2);
        let narrowed = template.handler.complete("id", &first[..8]).await;
        assert!(narrowed.contains(&first));
        assert!(template.handler.complete("other", "").await.is_empty());
    }
}
