//! Named operations grouped by capability class.
//!
//! Everything is registered once at startup. A duplicate name within one
//! class is a programming error and fails startup.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

use super::context::RequestContext;
use super::schema::Shape;
use super::uri_template::{TemplateVars, UriTemplate};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Tool,
    Resource,
    Prompt,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Capability::Tool => "tool",
            Capability::Resource => "resource",
            Capability::Prompt => "prompt",
        })
    }
}

#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// `args` has already passed the tool's input schema.
    async fn call(&self, args: Value, ctx: RequestContext) -> Result<Value>;
}

#[async_trait]
pub trait ResourceHandler: Send + Sync {
    async fn read(&self, uri: &str, vars: &TemplateVars) -> Result<ResourceContents>;

    /// Concrete addresses a template currently resolves to.
    async fn list(&self) -> Vec<Resource> {
        Vec::new()
    }

    /// Candidate values for `placeholder` starting with `prefix`.
    async fn complete(&self, _placeholder: &str, _prefix: &str) -> Vec<String> {
        Vec::new()
    }
}

#[async_trait]
pub trait PromptHandler: Send + Sync {
    async fn render(&self, args: &HashMap<String, String>) -> Result<Vec<PromptMessage>>;

    async fn complete(&self, _argument: &str, _prefix: &str) -> Vec<String> {
        Vec::new()
    }
}

/// One addressable resource as listed by `resources/list`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub uri: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContents {
    pub uri: String,
    pub mime_type: String,
    pub text: String,
}

impl ResourceContents {
    pub fn json(uri: &str, value: &Value) -> Result<Self> {
        Ok(Self {
            uri: uri.to_string(),
            mime_type: "application/json".to_string(),
            text: serde_json::to_string_pretty(value)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    Text { text: String },
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Content::Text { text: text.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptMessage {
    pub role: Role,
    pub content: Content,
}

impl PromptMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Content::text(text),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Content::text(text),
        }
    }
}

pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input: Shape,
    pub output: Option<Shape>,
    pub handler: Arc<dyn ToolHandler>,
}

impl fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("input", &self.input)
            .field("output", &self.output)
            .finish_non_exhaustive()
    }
}

impl ToolDescriptor {
    /// Compiles `input_schema`; an unusable schema fails startup.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            description: description.into(),
            input: Shape::compile(input_schema)?,
            output: None,
            handler,
        })
    }

    pub fn with_output_schema(mut self, schema: Value) -> Result<Self> {
        self.output = Some(Shape::compile(schema)?);
        Ok(self)
    }

    /// Entry for `tools/list`.
    pub fn definition(&self) -> Value {
        let mut def = json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.input.schema(),
        });
        if let Some(output) = &self.output {
            def["outputSchema"] = output.schema().clone();
        }
        def
    }
}

#[derive(Debug, Clone)]
pub enum ResourceAddress {
    Literal(String),
    Template(UriTemplate),
}

impl ResourceAddress {
    fn key(&self) -> &str {
        match self {
            ResourceAddress::Literal(uri) => uri,
            ResourceAddress::Template(t) => t.pattern(),
        }
    }
}

pub struct ResourceDescriptor {
    pub name: String,
    pub description: String,
    pub mime_type: String,
    pub address: ResourceAddress,
    pub handler: Arc<dyn ResourceHandler>,
}

impl fmt::Debug for ResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceDescriptor")
            .field("name", &self.name)
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl ResourceDescriptor {
    pub fn literal(
        uri: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        handler: Arc<dyn ResourceHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            mime_type: "application/json".to_string(),
            address: ResourceAddress::Literal(uri.into()),
            handler,
        }
    }

    pub fn template(
        pattern: &str,
        name: impl Into<String>,
        description: impl Into<String>,
        handler: Arc<dyn ResourceHandler>,
    ) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            description: description.into(),
            mime_type: "application/json".to_string(),
            address: ResourceAddress::Template(UriTemplate::parse(pattern)?),
            handler,
        })
    }

    /// Entry for `resources/templates/list`; `None` for literal resources.
    pub fn template_definition(&self) -> Option<Value> {
        match &self.address {
            ResourceAddress::Template(t) => Some(json!({
                "uriTemplate": t.pattern(),
                "name": self.name,
                "description": self.description,
                "mimeType": self.mime_type,
            })),
            ResourceAddress::Literal(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptArgument {
    pub name: String,
    pub description: String,
    pub required: bool,
}

impl PromptArgument {
    pub fn required(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            required: true,
        }
    }

    pub fn optional(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            required: false,
        }
    }
}

pub struct PromptDescriptor {
    pub name: String,
    pub description: String,
    pub arguments: Vec<PromptArgument>,
    pub handler: Arc<dyn PromptHandler>,
}

impl PromptDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        arguments: Vec<PromptArgument>,
        handler: Arc<dyn PromptHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            arguments,
            handler,
        }
    }

    pub fn definition(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "arguments": self.arguments,
        })
    }

    /// Fails on a missing required argument or an undeclared one.
    pub fn check_arguments(&self, args: &HashMap<String, String>) -> Result<()> {
        if let Some(missing) = self
            .arguments
            .iter()
            .find(|a| a.required && !args.contains_key(&a.name))
        {
            return Err(Error::InvalidParams(format!(
                "arguments: missing required field '{}'",
                missing.name
            )));
        }
        if let Some(unknown) = args
            .keys()
            .find(|k| !self.arguments.iter().any(|a| &a.name == *k))
        {
            return Err(Error::InvalidParams(format!(
                "arguments: unknown field '{unknown}'"
            )));
        }
        Ok(())
    }
}

/// Uniform registration wrapper, one variant per capability class.
pub enum Operation {
    Tool(ToolDescriptor),
    Resource(ResourceDescriptor),
    Prompt(PromptDescriptor),
}

impl Operation {
    pub fn capability(&self) -> Capability {
        match self {
            Operation::Tool(_) => Capability::Tool,
            Operation::Resource(_) => Capability::Resource,
            Operation::Prompt(_) => Capability::Prompt,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Operation::Tool(t) => &t.name,
            Operation::Resource(r) => &r.name,
            Operation::Prompt(p) => &p.name,
        }
    }
}

impl From<ToolDescriptor> for Operation {
    fn from(d: ToolDescriptor) -> Self {
        Operation::Tool(d)
    }
}

impl From<ResourceDescriptor> for Operation {
    fn from(d: ResourceDescriptor) -> Self {
        Operation::Resource(d)
    }
}

impl From<PromptDescriptor> for Operation {
    fn from(d: PromptDescriptor) -> Self {
        Operation::Prompt(d)
    }
}

#[derive(Default)]
pub struct Registry {
    tools: Vec<ToolDescriptor>,
    resources: Vec<ResourceDescriptor>,
    prompts: Vec<PromptDescriptor>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, operation: impl Into<Operation>) -> Result<()> {
        let operation = operation.into();
        let capability = operation.capability();
        let name = operation.name().to_string();

        let duplicate = match &operation {
            Operation::Tool(_) => self.tool(&name).is_some(),
            Operation::Prompt(_) => self.prompt(&name).is_some(),
            Operation::Resource(r) => self
                .resources
                .iter()
                .any(|existing| existing.name == name || existing.address.key() == r.address.key()),
        };
        if duplicate {
            return Err(Error::DuplicateRegistration { capability, name });
        }

        tracing::debug!(%capability, %name, "Registered operation");
        match operation {
            Operation::Tool(t) => self.tools.push(t),
            Operation::Resource(r) => self.resources.push(r),
            Operation::Prompt(p) => self.prompts.push(p),
        }
        Ok(())
    }

    pub fn tool(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn prompt(&self, name: &str) -> Option<&PromptDescriptor> {
        self.prompts.iter().find(|p| p.name == name)
    }

    pub fn prompts(&self) -> &[PromptDescriptor] {
        &self.prompts
    }

    /// Template resources in registration order.
    pub fn templates(&self) -> impl Iterator<Item = &ResourceDescriptor> {
        self.resources
            .iter()
            .filter(|r| matches!(r.address, ResourceAddress::Template(_)))
    }

    pub fn resource_template(&self, pattern: &str) -> Option<&ResourceDescriptor> {
        self.templates().find(|r| r.address.key() == pattern)
    }

    /// Every literal resource, then the current output of each template's
    /// lister. Listers run on every call.
    pub async fn list_addressable(&self) -> Vec<Resource> {
        let mut listed: Vec<Resource> = self
            .resources
            .iter()
            .filter_map(|r| match &r.address {
                ResourceAddress::Literal(uri) => Some(Resource {
                    uri: uri.clone(),
                    name: r.name.clone(),
                    description: Some(r.description.clone()),
                    mime_type: Some(r.mime_type.clone()),
                }),
                ResourceAddress::Template(_) => None,
            })
            .collect();

        for template in self.templates() {
            listed.extend(template.handler.list().await);
        }
        listed
    }

    /// Literal addresses win over templates; templates are tried in
    /// registration order and the first match supplies the variables.
    pub fn resolve_address(&self, uri: &str) -> Result<(&ResourceDescriptor, TemplateVars)> {
        if let Some(literal) = self
            .resources
            .iter()
            .find(|r| matches!(&r.address, ResourceAddress::Literal(l) if l == uri))
        {
            return Ok((literal, TemplateVars::new()));
        }

        self.templates()
            .find_map(|r| match &r.address {
                ResourceAddress::Template(t) => t.matches(uri).map(|vars| (r, vars)),
                ResourceAddress::Literal(_) => None,
            })
            .ok_or_else(|| Error::ResourceNotFound(uri.to_string()))
    }
}
