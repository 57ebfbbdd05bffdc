//! `batch_calculate`: many calculations, one response.
//!
//! The whole array is shape-checked before any item runs, so a malformed
//! or oversized batch fails as a unit. Business-rule failures of single
//! items are reported inline and never fail the batch.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::arithmetic::{calculate_input_schema, evaluate, CalculateArgs};
use super::parse_args;
use crate::calc::ops::serialize_number;
use crate::calc::ServerState;
use crate::mcp::context::RequestContext;
use crate::mcp::registry::{ToolDescriptor, ToolHandler};
use crate::Result;

pub const MAX_BATCH_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
pub struct BatchArgs {
    pub items: Vec<CalculateArgs>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ItemOutcome {
    #[serde(rename_all = "camelCase")]
    Succeeded {
        success: bool,
        expression: String,
        #[serde(serialize_with = "serialize_number")]
        value: f64,
        history_id: String,
    },
    Failed {
        success: bool,
        expression: String,
        error: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Debug, Serialize)]
pub struct BatchResult {
    pub results: Vec<ItemOutcome>,
    pub summary: BatchSummary,
}

/// Runs `items` sequentially in input order, reporting progress after each.
pub async fn run_batch(state: &ServerState, items: &[CalculateArgs], ctx: &RequestContext) -> BatchResult {
    let total = items.len();
    let mut results = Vec::with_capacity(total);

    for (i, item) in items.iter().enumerate() {
        let outcome = match evaluate(state, item).await {
            Ok(entry) => ItemOutcome::Succeeded {
                success: true,
                expression: entry.expression,
                value: entry.result,
                history_id: entry.id,
            },
            Err(err) => {
                debug!(request_id = %ctx.request_id, item = i, error = %err, "Batch item failed");
                ItemOutcome::Failed {
                    success: false,
                    expression: item.op.expression(item.a, item.b),
                    error: err.wire_message(),
                }
            }
        };
        results.push(outcome);

        let done = i + 1;
        let percent = (done * 100 / total) as u8;
        ctx.progress
            .report(percent, Some(&format!("Processed {done} of {total} items")));
    }

    let succeeded = results
        .iter()
        .filter(|r| matches!(r, ItemOutcome::Succeeded { .. }))
        .count();
    BatchResult {
        summary: BatchSummary {
            total,
            succeeded,
            failed: total - succeeded,
        },
        results,
    }
}

pub struct BatchCalculate {
    state: Arc<ServerState>,
}

#[async_trait]
impl ToolHandler for BatchCalculate {
    async fn call(&self, args: Value, ctx: RequestContext) -> Result<Value> {
        let args: BatchArgs = parse_args(args)?;
        let result = run_batch(&self.state, &args.items, &ctx).await;
        Ok(serde_json::to_value(result)?)
    }
}

pub fn batch_calculate_tool(state: Arc<ServerState>) -> Result<ToolDescriptor> {
    ToolDescriptor::new(
        "batch_calculate",
        "Run up to 100 calculations in one request; failed items do not fail the batch",
        serde_json::json!({
            "type": "object",
            "properties": {
                "items": {
                    "type": "array",
                    "minItems": 1,
                    "maxItems": MAX_BATCH_SIZE,
                    "items": calculate_input_schema()
                }
            },
            "required": ["items"],
            "additionalProperties": false
        }),
        Arc::new(BatchCalculate { state }),
    )
}
