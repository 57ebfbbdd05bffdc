//! Tutoring prompt templates.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::registry::{PromptArgument, PromptDescriptor, PromptHandler, PromptMessage, Registry};
use crate::calc::{AdvancedOp, BinaryOp};
use crate::{Error, Result};

const LEVELS: [&str; 3] = ["beginner", "intermediate", "advanced"];
const TOPICS: [&str; 6] = [
    "addition",
    "subtraction",
    "multiplication",
    "division",
    "fractions",
    "exponents",
];
const DEFAULT_PRACTICE_COUNT: u32 = 5;
const MAX_PRACTICE_COUNT: u32 = 20;

fn operation_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = BinaryOp::ALL.iter().map(|op| op.name()).collect();
    for op in AdvancedOp::ALL {
        if !names.contains(&op.name()) {
            names.push(op.name());
        }
    }
    names
}

fn starting_with(candidates: impl IntoIterator<Item = &'static str>, prefix: &str) -> Vec<String> {
    candidates
        .into_iter()
        .filter(|c| c.starts_with(prefix))
        .map(String::from)
        .collect()
}

fn level(args: &HashMap<String, String>) -> Result<&str> {
    match args.get("level").map(String::as_str) {
        None => Ok("beginner"),
        Some(l) if LEVELS.contains(&l) => Ok(l),
        Some(other) => Err(Error::InvalidParams(format!(
            "arguments.level: must be one of {}, got '{other}'",
            LEVELS.join(", ")
        ))),
    }
}

pub struct ExplainOperation;

#[async_trait]
impl PromptHandler for ExplainOperation {
    async fn render(&self, args: &HashMap<String, String>) -> Result<Vec<PromptMessage>> {
        let operation = args
            .get("operation")
            .ok_or_else(|| Error::InvalidParams("arguments: missing required field 'operation'".to_string()))?;
        let level = level(args)?;

        let style = match level {
            "beginner" => "Use simple words and a concrete everyday example.",
            "intermediate" => "Include the formal definition and one worked example.",
            _ => "Cover edge cases, domain restrictions and how the operation generalises.",
        };

        Ok(vec![
            PromptMessage::user(format!(
                "Explain the '{operation}' operation to a {level} student. {style}"
            )),
            PromptMessage::assistant(format!(
                "Sure. Let's look at how '{operation}' works, step by step."
            )),
        ])
    }

    async fn complete(&self, argument: &str, prefix: &str) -> Vec<String> {
        match argument {
            "operation" => starting_with(operation_names(), prefix),
            "level" => starting_with(LEVELS, prefix),
            _ => Vec::new(),
        }
    }
}

pub struct PracticeSet;

#[async_trait]
impl PromptHandler for PracticeSet {
    async fn render(&self, args: &HashMap<String, String>) -> Result<Vec<PromptMessage>> {
        let topic = args
            .get("topic")
            .ok_or_else(|| Error::InvalidParams("arguments: missing required field 'topic'".to_string()))?;
        let count = match args.get("count") {
            None => DEFAULT_PRACTICE_COUNT,
            Some(raw) => match raw.parse::<u32>() {
                Ok(n) if (1..=MAX_PRACTICE_COUNT).contains(&n) => n,
                _ => {
                    return Err(Error::InvalidParams(format!(
                        "arguments.count: must be an integer between 1 and {MAX_PRACTICE_COUNT}"
                    )))
                }
            },
        };

        Ok(vec![PromptMessage::user(format!(
            "Create {count} practice problems about {topic}, ordered from easiest to hardest. \
             Number them and list the answers separately at the end."
        ))])
    }

    async fn complete(&self, argument: &str, prefix: &str) -> Vec<String> {
        match argument {
            "topic" => starting_with(TOPICS, prefix),
            _ => Vec::new(),
        }
    }
}

pub fn register_all(registry: &mut Registry) -> Result<()> {
    registry.register(PromptDescriptor::new(
        "explain_operation",
        "Explain a math operation at a chosen level",
        vec![
            PromptArgument::required("operation", "Operation to explain, e.g. 'divide'"),
            PromptArgument::optional("level", "beginner, intermediate or advanced"),
        ],
        Arc::new(ExplainOperation),
    ))?;
    registry.register(PromptDescriptor::new(
        "practice_set",
        "Generate a set of practice problems on a topic",
        vec![
            PromptArgument::required("topic", "Topic such as 'fractions'"),
            PromptArgument::optional("count", "Number of problems (1-20, default 5)"),
        ],
        Arc::new(PracticeSet),
    ))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::registry::Content;
    use assert_matches::assert_matches;

    fn args(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn text(message: &PromptMessage) -> &str {
        let Content::Text { text } = &message.content;
        text
    }

    #[tokio::test]
    async fn test_explain_defaults_to_beginner() {
        let messages = ExplainOperation.render(&args(&[("operation", "modulo")])).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert!(text(&messages[0]).contains("'modulo'"));
        assert!(text(&messages[0]).contains("beginner"));
    }

    #[tokio::test]
    async fn test_explain_rejects_unknown_level() {
        let result = ExplainOperation
            .render(&args(&[("operation", "add"), ("level", "expert")]))
            .await;
        assert_matches!(result, Err(Error::InvalidParams(msg)) if msg.contains("arguments.level"));
    }

    #[tokio::test]
    async fn test_practice_set_count() {
        let messages = PracticeSet.render(&args(&[("topic", "fractions"), ("count", "3")])).await.unwrap();
        assert!(text(&messages[0]).starts_with("Create 3 practice problems about fractions"));

        assert_matches!(
            PracticeSet.render(&args(&[("topic", "fractions"), ("count", "0")])).await,
            Err(Error::InvalidParams(_))
        );
    }

    #[tokio::test]
    async fn test_completions() {
        assert_eq!(ExplainOperation.complete("operation", "s").await, ["subtract", "sqrt"]);
        assert_eq!(ExplainOperation.complete("level", "int").await, ["intermediate"]);
        assert_eq!(PracticeSet.complete("topic", "f").await, ["fractions"]);
        assert!(PracticeSet.complete("count", "").await.is_empty());
    }

    #[test]
    fn test_register_all() {
        let mut registry = Registry::new();
        register_all(&mut registry).unwrap();
        assert!(registry.prompt("explain_operation").is_some());
        assert!(registry.prompt("practice_set").is_some());
        assert!(register_all(&mut registry).is_err());
    }
}
