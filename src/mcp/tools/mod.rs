pub mod arithmetic;
pub mod batch;
pub mod practice;
pub mod series;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use super::registry::Registry;
use crate::calc::ServerState;
use crate::config::ServerConfig;
use crate::{Error, Result};

/// Coerces already shape-checked arguments into a typed struct. The
/// deserializer's own wording names Rust types, so it only reaches the log.
pub(crate) fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T> {
    serde_json::from_value(args).map_err(|e| {
        debug!(error = %e, "Arguments passed the schema but not the typed decode");
        Error::InvalidParams("arguments: value does not fit the declared types".to_string())
    })
}

pub fn register_all(registry: &mut Registry, state: &Arc<ServerState>, config: &ServerConfig) -> Result<()> {
    registry.register(arithmetic::calculate_tool(Arc::clone(state))?)?;
    registry.register(arithmetic::advanced_calculate_tool(Arc::clone(state))?)?;
    registry.register(batch::batch_calculate_tool(Arc::clone(state))?)?;
    registry.register(series::sequence_sum_tool(config.progress_delay_ms)?)?;
    registry.register(practice::practice_problem_tool()?)?;
    registry.register(arithmetic::list_history_tool(Arc::clone(state))?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_all_names() {
        let mut registry = Registry::new();
        register_all(&mut registry, &Arc::new(ServerState::new()), &ServerConfig::default()).unwrap();
        let names: Vec<_> = registry.tools().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "calculate",
                "advanced_calculate",
                "batch_calculate",
                "sequence_sum",
                "practice_problem",
                "list_history"
            ]
        );
    }

    #[test]
    fn test_parse_args_failure_is_invalid_params() {
        let err = parse_args::<arithmetic::CalculateArgs>(serde_json::json!({"a": 1})).unwrap_err();
        assert_eq!(err.error_code(), -32602);
    }

    #[test]
    fn test_parse_args_hides_decoder_wording() {
        // 2.0 satisfies "type": "integer" but not the usize field behind it.
        let err = parse_args::<arithmetic::ListHistoryArgs>(serde_json::json!({"limit": 2.0})).unwrap_err();
        assert_eq!(err.error_code(), -32602);
        let message = err.to_string();
        assert!(message.contains("arguments"), "{message}");
        assert!(!message.contains("usize"), "{message}");
        assert!(!message.contains("f64"), "{message}");
    }
}
