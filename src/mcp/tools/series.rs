use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::parse_args;
use crate::mcp::context::RequestContext;
use crate::mcp::registry::{ToolDescriptor, ToolHandler};
use crate::Result;

const MAX_N: u64 = 10_000;
const MAX_STEPS: u64 = 20;
const MAX_DELAY_MS: u64 = 5_000;
const DEFAULT_STEPS: u64 = 5;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceSumArgs {
    pub n: u64,
    #[serde(default)]
    pub steps: Option<u64>,
    #[serde(default)]
    pub delay_ms: Option<u64>,
}

/// Sums `1..=n` in chunks, pausing between chunks so progress is visible.
pub struct SequenceSum {
    default_delay: Duration,
}

#[async_trait]
impl ToolHandler for SequenceSum {
    async fn call(&self, args: Value, ctx: RequestContext) -> Result<Value> {
        let args: SequenceSumArgs = parse_args(args)?;
        let steps = args.steps.unwrap_or(DEFAULT_STEPS).clamp(1, args.n);
        let delay = args
            .delay_ms
            .map(Duration::from_millis)
            .unwrap_or(self.default_delay);

        let chunk = args.n.div_ceil(steps);
        let mut sum = 0u64;
        let mut start = 1u64;
        let mut step = 0u64;
        while start <= args.n {
            let end = (start + chunk - 1).min(args.n);
            sum += (start..=end).sum::<u64>();
            step += 1;

            let percent = (end * 100 / args.n) as u8;
            ctx.progress
                .report(percent, Some(&format!("Summed 1..={end}")));

            start = end + 1;
            if start <= args.n && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        Ok(json!({
            "n": args.n,
            "sum": sum,
            "steps": step,
        }))
    }
}

pub fn sequence_sum_tool(default_delay_ms: u64) -> Result<ToolDescriptor> {
    ToolDescriptor::new(
        "sequence_sum",
        "Sum the integers 1..=n, reporting progress along the way",
        json!({
            "type": "object",
            "properties": {
                "n": { "type": "integer", "minimum": 1, "maximum": MAX_N },
                "steps": { "type": "integer", "minimum": 1, "maximum": MAX_STEPS },
                "delayMs": { "type": "integer", "minimum": 0, "maximum": MAX_DELAY_MS }
            },
            "required": ["n"],
            "additionalProperties": false
        }),
        Arc::new(SequenceSum {
            default_delay: Duration::from_millis(default_delay_ms),
        }),
    )?
    .with_output_schema(json!({
        "type": "object",
        "properties": {
            "n": { "type": "integer" },
            "sum": { "type": "integer" },
            "steps": { "type": "integer" }
        },
        "required": ["n", "sum", "steps"]
    }))
}
