use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::parse_args;
use crate::calc::ops::{format_number, number_value};
use crate::calc::{AdvancedOp, BinaryOp, HistoryEntry, ServerState, MAX_HISTORY};
use crate::mcp::context::RequestContext;
use crate::mcp::registry::{ToolDescriptor, ToolHandler};
use crate::Result;

#[derive(Debug, Clone, Deserialize)]
pub struct CalculateArgs {
    pub a: f64,
    pub b: f64,
    pub op: BinaryOp,
}

#[derive(Debug, Deserialize)]
pub struct AdvancedArgs {
    pub operation: AdvancedOp,
    pub value: f64,
    pub exponent: Option<f64>,
    pub base: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct ListHistoryArgs {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    MAX_HISTORY
}

/// Runs one binary calculation and records it in history.
pub async fn evaluate(state: &ServerState, args: &CalculateArgs) -> Result<HistoryEntry> {
    let value = args.op.apply(args.a, args.b)?;
    let expression = format!(
        "{} = {}",
        args.op.expression(args.a, args.b),
        format_number(value)
    );
    let entry = HistoryEntry::new(args.op.name(), args.a, Some(args.b), value, expression);
    record(state, entry.clone()).await;
    Ok(entry)
}

async fn record(state: &ServerState, entry: HistoryEntry) {
    if let Some(evicted) = state.history.append(entry).await {
        debug!(evicted = %evicted.id, "History full, evicted oldest entry");
    }
}

fn calculation_result(entry: &HistoryEntry) -> Value {
    json!({
        "value": number_value(entry.result),
        "expression": entry.expression,
        "meta": {
            "calculationId": entry.id,
            "timestamp": entry.timestamp,
        }
    })
}

fn calculation_output_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "value": { "type": "number" },
            "expression": { "type": "string" },
            "meta": {
                "type": "object",
                "properties": {
                    "calculationId": { "type": "string" },
                    "timestamp": { "type": "string" }
                },
                "required": ["calculationId", "timestamp"]
            }
        },
        "required": ["value", "expression", "meta"]
    })
}

/// Input schema of one `{a, b, op}` calculation, shared with batches.
pub fn calculate_input_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "a": { "type": "number", "description": "First operand" },
            "b": { "type": "number", "description": "Second operand" },
            "op": {
                "type": "string",
                "enum": BinaryOp::ALL.map(BinaryOp::name),
                "description": "Operation to apply"
            }
        },
        "required": ["a", "b", "op"],
        "additionalProperties": false
    })
}

pub struct Calculate {
    state: Arc<ServerState>,
}

#[async_trait]
impl ToolHandler for Calculate {
    async fn call(&self, args: Value, _ctx: RequestContext) -> Result<Value> {
        let args: CalculateArgs = parse_args(args)?;
        let entry = evaluate(&self.state, &args).await?;
        Ok(calculation_result(&entry))
    }
}

pub fn calculate_tool(state: Arc<ServerState>) -> Result<ToolDescriptor> {
    ToolDescriptor::new(
        "calculate",
        "Apply a basic arithmetic operation to two numbers",
        calculate_input_schema(),
        Arc::new(Calculate { state }),
    )?
    .with_output_schema(calculation_output_schema())
}

pub struct AdvancedCalculate {
    state: Arc<ServerState>,
}

#[async_trait]
impl ToolHandler for AdvancedCalculate {
    async fn call(&self, args: Value, _ctx: RequestContext) -> Result<Value> {
        let args: AdvancedArgs = parse_args(args)?;
        let value = args.operation.apply(args.value, args.exponent, args.base)?;
        let expression = format!(
            "{} = {}",
            args.operation.expression(args.value, args.exponent, args.base),
            format_number(value)
        );
        let second = match args.operation {
            AdvancedOp::Power => args.exponent,
            AdvancedOp::Log => args.base,
            _ => None,
        };
        let entry = HistoryEntry::new(args.operation.name(), args.value, second, value, expression);
        record(&self.state, entry.clone()).await;
        Ok(calculation_result(&entry))
    }
}

pub fn advanced_calculate_tool(state: Arc<ServerState>) -> Result<ToolDescriptor> {
    ToolDescriptor::new(
        "advanced_calculate",
        "Square root, factorial, power, logarithm or absolute value of a number",
        json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": AdvancedOp::ALL.map(AdvancedOp::name)
                },
                "value": { "type": "number" },
                "exponent": {
                    "type": "number",
                    "description": "Required when operation is 'power'"
                },
                "base": {
                    "type": "number",
                    "description": "Logarithm base; natural log when omitted"
                }
            },
            "required": ["operation", "value"],
            "additionalProperties": false
        }),
        Arc::new(AdvancedCalculate { state }),
    )?
    .with_output_schema(calculation_output_schema())
}

pub struct ListHistory {
    state: Arc<ServerState>,
}

#[async_trait]
impl ToolHandler for ListHistory {
    async fn call(&self, args: Value, _ctx: RequestContext) -> Result<Value> {
        let args: ListHistoryArgs = parse_args(args)?;
        let entries = self.state.history.list(args.limit).await;
        Ok(json!({
            "count": entries.len(),
            "capacity": self.state.history.capacity(),
            "entries": entries,
        }))
    }
}

pub fn list_history_tool(state: Arc<ServerState>) -> Result<ToolDescriptor> {
    ToolDescriptor::new(
        "list_history",
        "List recent calculations, newest first",
        json!({
            "type": "object",
            "properties": {
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": MAX_HISTORY,
                    "description": "Maximum number of entries to return"
                }
            },
            "additionalProperties": false
        }),
        Arc::new(ListHistory { state }),
    )
}
