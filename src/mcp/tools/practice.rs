//! `practice_problem`: asks the user a generated question through
//! elicitation and grades the reply.

use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

use super::parse_args;
use crate::calc::ops::{format_number, number_value};
use crate::calc::BinaryOp;
use crate::mcp::client::ElicitAction;
use crate::mcp::context::RequestContext;
use crate::mcp::registry::{ToolDescriptor, ToolHandler};
use crate::{Error, Result};

const PRACTICE_OPS: [BinaryOp; 4] = [
    BinaryOp::Add,
    BinaryOp::Subtract,
    BinaryOp::Multiply,
    BinaryOp::Divide,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    #[default]
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    fn operand_range(self) -> std::ops::RangeInclusive<i64> {
        match self {
            Difficulty::Easy => 1..=10,
            Difficulty::Medium => 10..=100,
            Difficulty::Hard => 100..=1000,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PracticeArgs {
    pub operation: BinaryOp,
    #[serde(default)]
    pub difficulty: Difficulty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Problem {
    pub a: f64,
    pub b: f64,
    pub op: BinaryOp,
    pub answer: f64,
}

impl Problem {
    /// Division problems always have a whole-number answer.
    pub fn generate(op: BinaryOp, difficulty: Difficulty) -> Result<Self> {
        let mut rng = rand::rng();
        let range = difficulty.operand_range();
        let (a, b) = match op {
            BinaryOp::Divide => {
                let divisor = rng.random_range(range.clone()).max(1);
                let quotient = rng.random_range(range);
                (divisor * quotient, divisor)
            }
            _ => (rng.random_range(range.clone()), rng.random_range(range)),
        };
        let (a, b) = (a as f64, b as f64);
        Ok(Self {
            a,
            b,
            op,
            answer: op.apply(a, b)?,
        })
    }

    pub fn question(&self) -> String {
        format!("What is {}?", self.op.expression(self.a, self.b))
    }

    pub fn is_correct(&self, given: f64) -> bool {
        (given - self.answer).abs() < 1e-9
    }
}

fn answer_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "answer": { "type": "number", "description": "Your answer" }
        },
        "required": ["answer"]
    })
}

pub struct PracticeProblem;

#[async_trait]
impl ToolHandler for PracticeProblem {
    async fn call(&self, args: Value, ctx: RequestContext) -> Result<Value> {
        let args: PracticeArgs = parse_args(args)?;
        if !PRACTICE_OPS.contains(&args.operation) {
            return Err(Error::InvalidParams(format!(
                "practice problems are not available for '{}'",
                args.operation.name()
            )));
        }
        let problem = Problem::generate(args.operation, args.difficulty)?;

        let mut result = Map::new();
        result.insert("question".to_string(), json!(problem.question()));
        result.insert("operation".to_string(), json!(problem.op.name()));
        result.insert("difficulty".to_string(), json!(args.difficulty));
        result.insert("answer".to_string(), number_value(problem.answer));

        if !ctx.client.supports_elicitation() {
            debug!(request_id = %ctx.request_id, "Client cannot elicit, returning problem unanswered");
            result.insert("status".to_string(), json!("unanswered"));
            return Ok(Value::Object(result));
        }

        let reply = ctx
            .client
            .elicit(&problem.question(), answer_schema())
            .await?;

        let status = match reply.action {
            ElicitAction::Accept => {
                let given = reply
                    .content
                    .as_ref()
                    .and_then(|c| c.get("answer"))
                    .and_then(Value::as_f64)
                    .ok_or_else(|| {
                        Error::InvalidParams("elicitation reply is missing a numeric 'answer'".to_string())
                    })?;
                let correct = problem.is_correct(given);
                result.insert("given".to_string(), number_value(given));
                result.insert("correct".to_string(), json!(correct));
                result.insert(
                    "feedback".to_string(),
                    json!(if correct {
                        "Correct!".to_string()
                    } else {
                        format!("Not quite. The answer is {}.", format_number(problem.answer))
                    }),
                );
                "answered"
            }
            ElicitAction::Decline => "declined",
            ElicitAction::Cancel => "cancelled",
        };
        result.insert("status".to_string(), json!(status));
        Ok(Value::Object(result))
    }
}

pub fn practice_problem_tool() -> Result<ToolDescriptor> {
    ToolDescriptor::new(
        "practice_problem",
        "Ask the user an arithmetic practice question and grade the answer",
        json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": PRACTICE_OPS.map(BinaryOp::name)
                },
                "difficulty": {
                    "type": "string",
                    "enum": ["easy", "medium", "hard"]
                }
            },
            "required": ["operation"],
            "additionalProperties": false
        }),
        Arc::new(PracticeProblem),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_problems_are_consistent() {
        for op in PRACTICE_OPS {
            for difficulty in [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard] {
                let p = Problem::generate(op, difficulty).unwrap();
                assert_eq!(p.answer, op.apply(p.a, p.b).unwrap());
                if op == BinaryOp::Divide {
                    assert_eq!(p.answer.fract(), 0.0);
                }
                assert!(p.is_correct(p.answer));
                assert!(!p.is_correct(p.answer + 1.0));
            }
        }
    }

    #[tokio::test]
    async fn test_without_elicitation_returns_unanswered() {
        let (ctx, mut rx) = RequestContext::for_test(1);
        let result = PracticeProblem
            .call(json!({"operation": "multiply", "difficulty": "medium"}), ctx)
            .await
            .unwrap();
        assert_eq!(result["status"], "unanswered");
        assert_eq!(result["difficulty"], "medium");
        assert!(result["question"].as_str().unwrap().contains(" * "));
        assert!(rx.try_recv().is_err());
    }
}
