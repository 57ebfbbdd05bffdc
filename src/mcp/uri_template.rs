use std::collections::HashMap;

use regex::Regex;

use crate::{Error, Result};

/// Placeholder values extracted from a concrete URI.
pub type TemplateVars = HashMap<String, String>;

/// A resource address with simple `{name}` placeholders, e.g.
/// `math://history/{id}`. A placeholder matches one non-empty path segment.
#[derive(Debug, Clone)]
pub struct UriTemplate {
    pattern: String,
    names: Vec<String>,
    regex: Regex,
}

impl UriTemplate {
    pub fn parse(pattern: &str) -> Result<Self> {
        let invalid = |why: &str| Error::Internal(format!("invalid URI template '{pattern}': {why}"));

        let mut names = Vec::new();
        let mut source = String::from("^");
        let mut rest = pattern;
        while let Some(open) = rest.find('{') {
            if open == 0 {
                return Err(if names.is_empty() {
                    invalid("must start with a literal scheme")
                } else {
                    invalid("adjacent placeholders")
                });
            }
            let literal = &rest[..open];
            if literal.contains('}') {
                return Err(invalid("unmatched '}'"));
            }
            source.push_str(&regex::escape(literal));

            let close = rest[open..]
                .find('}')
                .map(|i| open + i)
                .ok_or_else(|| invalid("unclosed placeholder"))?;
            let name = &rest[open + 1..close];
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(invalid("placeholder names must be alphanumeric"));
            }
            names.push(name.to_string());
            source.push_str("([^/]+)");
            rest = &rest[close + 1..];
        }
        if rest.contains('}') {
            return Err(invalid("unmatched '}'"));
        }
        if names.is_empty() && rest.is_empty() {
            return Err(invalid("must start with a literal scheme"));
        }
        source.push_str(&regex::escape(rest));
        source.push('$');

        let regex = Regex::new(&source).map_err(|e| invalid(&e.to_string()))?;
        Ok(Self {
            pattern: pattern.to_string(),
            names,
            regex,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Extracts placeholder values when `uri` fits this template.
    pub fn matches(&self, uri: &str) -> Option<TemplateVars> {
        let captures = self.regex.captures(uri)?;
        self.names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                captures
                    .get(i + 1)
                    .map(|m| (name.clone(), m.as_str().to_string()))
            })
            .collect()
    }
}
