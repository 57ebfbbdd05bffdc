//! Declared shapes for operation inputs and outputs, compiled once with
//! `jsonschema` when the operation is described.
//!
//! Violations name the offending location (`params.items[1]`) so callers can
//! fix their input without seeing validator internals.

use std::fmt;

use jsonschema::error::ValidationErrorKind;
use jsonschema::{ValidationError, Validator};
use serde_json::Value;

use crate::{Error, Result};

pub struct Shape {
    schema: Value,
    validator: Validator,
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shape").field("schema", &self.schema).finish()
    }
}

impl Shape {
    /// Fails when `schema` is not a usable JSON Schema.
    pub fn compile(schema: Value) -> Result<Self> {
        let validator = jsonschema::validator_for(&schema)
            .map_err(|e| Error::Internal(format!("invalid schema: {e}")))?;
        Ok(Self { schema, validator })
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// Checks `value`, reporting the first violation under `root`.
    pub fn check(&self, value: &Value, root: &str) -> std::result::Result<(), String> {
        match self.validator.iter_errors(value).next() {
            None => Ok(()),
            Some(error) => Err(describe(&error, root)),
        }
    }
}

fn describe(error: &ValidationError<'_>, root: &str) -> String {
    let location = location(&error.instance_path.to_string(), root);
    // Array-size errors would otherwise echo the whole array.
    match &error.kind {
        ValidationErrorKind::MaxItems { limit } => {
            format!("{location}: expected at most {limit} items")
        }
        ValidationErrorKind::MinItems { limit } => {
            format!("{location}: expected at least {limit} items")
        }
        _ => format!("{location}: {error}"),
    }
}

/// `/items/1/a` under `params` becomes `params.items[1].a`.
fn location(pointer: &str, root: &str) -> String {
    let mut out = root.to_string();
    for segment in pointer.split('/').filter(|s| !s.is_empty()) {
        let segment = segment.replace("~1", "/").replace("~0", "~");
        if segment.chars().all(|c| c.is_ascii_digit()) {
            out.push_str(&format!("[{segment}]"));
        } else {
            out.push('.');
            out.push_str(&segment);
        }
    }
    out
}
