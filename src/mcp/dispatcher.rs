//! Routes decoded requests to registered operations.
//!
//! Each request moves through `received -> validating -> executing` and ends
//! `completed`, `failed` (caller-facing error) or `crashed` (opaque internal
//! error). Exactly one response is queued per request, after every progress
//! notification the handler queued.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

use super::client::{ClientRequester, PendingRequests};
use super::context::RequestContext;
use super::protocol::{
    JsonRpcClientResponse, JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    RequestId, MCP_PROTOCOL_VERSION, SERVER_NAME,
};
use super::registry::{Content, Registry, ToolDescriptor};
use super::transport::Outbound;
use crate::calc::ServerState;
use crate::config::ServerConfig;
use crate::{Error, Result};

/// Most values returned by one `completion/complete`.
const MAX_COMPLETIONS: usize = 100;

/// Aborts the wrapped task when dropped, so a dropped request future takes
/// its routing task with it.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Holds a request id in the in-flight set until dropped.
struct InFlight<'a> {
    ids: &'a Mutex<HashSet<RequestId>>,
    id: RequestId,
}

impl<'a> InFlight<'a> {
    /// `None` when `id` is already taken.
    fn claim(ids: &'a Mutex<HashSet<RequestId>>, id: &RequestId) -> Option<Self> {
        let inserted = ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone());
        inserted.then(|| Self { ids, id: id.clone() })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

fn panic_detail(payload: Box<dyn Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

#[derive(Debug, Deserialize)]
struct CallToolParams {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ReadResourceParams {
    uri: String,
}

#[derive(Debug, Deserialize)]
struct GetPromptParams {
    name: String,
    #[serde(default)]
    arguments: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum CompletionRef {
    #[serde(rename = "ref/prompt")]
    Prompt { name: String },
    #[serde(rename = "ref/resource")]
    Resource { uri: String },
}

#[derive(Debug, Deserialize)]
struct CompletionArgument {
    name: String,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct CompleteParams {
    #[serde(rename = "ref")]
    reference: CompletionRef,
    argument: CompletionArgument,
}

fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T> {
    serde_json::from_value(params).map_err(|e| Error::InvalidParams(format!("params: {e}")))
}

pub struct Dispatcher {
    registry: Arc<Registry>,
    state: Arc<ServerState>,
    pending: Arc<PendingRequests>,
    in_flight: Mutex<HashSet<RequestId>>,
    request_timeout: Option<Duration>,
    elicitation_timeout: Duration,
    supports_elicitation: AtomicBool,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>, state: Arc<ServerState>, config: &ServerConfig) -> Self {
        Self {
            registry,
            state,
            pending: Arc::new(PendingRequests::new()),
            in_flight: Mutex::new(HashSet::new()),
            request_timeout: config.request_timeout_ms.map(Duration::from_millis),
            elicitation_timeout: Duration::from_millis(config.elicitation_timeout_ms),
            supports_elicitation: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> &Arc<ServerState> {
        &self.state
    }

    /// Handles one request and queues its single response on `outbound`.
    pub async fn handle_request(self: &Arc<Self>, request: JsonRpcRequest, outbound: Outbound) {
        let id = request.id.clone();
        let method = request.method.clone();
        let count = self.state.stats.record_request();
        debug!(request_id = %id, method = %method, count, phase = "received", "Received request");

        let Some(in_flight) = InFlight::claim(&self.in_flight, &id) else {
            warn!(request_id = %id, "Rejecting request: id already in flight");
            let err = Error::InvalidRequest(format!("request id {id} is already in flight"));
            self.respond(&outbound, id, Err(err));
            return;
        };

        // Routing runs in its own task so a panic anywhere in it becomes a
        // JoinError instead of taking the connection down.
        let this = Arc::clone(self);
        let route_outbound = outbound.clone();
        let task = tokio::spawn(async move { this.route(request, &route_outbound).await });
        let _abort = AbortOnDrop(task.abort_handle());
        let joined = async {
            match task.await {
                Ok(outcome) => outcome,
                Err(join_err) if join_err.is_panic() => Err(Error::Internal(format!(
                    "request '{method}' panicked: {}",
                    panic_detail(join_err.into_panic())
                ))),
                Err(join_err) => Err(Error::Internal(format!(
                    "request '{method}' task failed: {join_err}"
                ))),
            }
        };

        let outcome = match self.request_timeout {
            Some(limit) => match tokio::time::timeout(limit, joined).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(request_id = %id, timeout_ms = limit.as_millis() as u64, "Request timed out");
                    Err(Error::Timeout(limit.as_millis() as u64))
                }
            },
            None => joined.await,
        };

        drop(in_flight);
        self.respond(&outbound, id, outcome);
    }

    pub async fn handle_notification(&self, notification: JsonRpcNotification) {
        match notification.method.as_str() {
            "notifications/initialized" => info!("Client initialized"),
            "notifications/cancelled" => {
                let params = notification.params.unwrap_or(Value::Null);
                let request_id = params.get("requestId").cloned().unwrap_or(Value::Null);
                let reason = params.get("reason").and_then(Value::as_str).unwrap_or("");
                info!(request_id = %request_id, reason, "Client cancelled request");
            }
            other => debug!(method = other, "Ignoring notification"),
        }
    }

    /// Hands a client's answer to the server-initiated request waiting on it.
    pub fn resolve_client_response(&self, response: JsonRpcClientResponse) {
        self.pending.resolve(response);
    }

    /// Fails every server-initiated request still waiting on the client and
    /// refuses new ones.
    pub fn abandon_client_requests(&self) {
        let n = self.pending.abandon_all();
        if n > 0 {
            warn!(count = n, "Abandoned unanswered client requests");
        }
    }

    fn respond(&self, outbound: &Outbound, id: RequestId, outcome: Result<Value>) {
        let queued = match outcome {
            Ok(result) => {
                debug!(request_id = %id, phase = "completed", "Request completed");
                outbound.send(&JsonRpcResponse::success(id.clone(), result))
            }
            Err(err) => {
                if err.is_caller_error() {
                    debug!(request_id = %id, code = err.error_code(), error = %err, phase = "failed", "Request failed");
                } else {
                    error!(request_id = %id, error = %err, phase = "crashed", "Request crashed");
                }
                outbound.send(&JsonRpcError::from_error(id.clone(), &err))
            }
        };
        if let Err(e) = queued {
            warn!(request_id = %id, error = %e, "Failed to queue response");
        }
    }

    async fn route(&self, request: JsonRpcRequest, outbound: &Outbound) -> Result<Value> {
        let id = request.id;
        let params = request.params.unwrap_or_else(|| json!({}));

        match request.method.as_str() {
            "initialize" => Ok(self.initialize(&params)),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({
                "tools": self.registry.tools().iter().map(ToolDescriptor::definition).collect::<Vec<_>>()
            })),
            "tools/call" => {
                let call: CallToolParams = parse_params(params)?;
                let tool = self
                    .registry
                    .tool(&call.name)
                    .ok_or_else(|| Error::MethodNotFound(call.name.clone()))?;
                let args = call.arguments.unwrap_or_else(|| json!({}));
                let value = self.run_tool(tool, id, args, "arguments", outbound).await?;
                Ok(json!({
                    "content": [Content::text(serde_json::to_string(&value)?)],
                    "structuredContent": value,
                }))
            }
            "resources/list" => Ok(json!({ "resources": self.registry.list_addressable().await })),
            "resources/templates/list" => Ok(json!({
                "resourceTemplates": self
                    .registry
                    .templates()
                    .filter_map(|r| r.template_definition())
                    .collect::<Vec<_>>()
            })),
            "resources/read" => {
                let read: ReadResourceParams = parse_params(params)?;
                let (resource, vars) = self.registry.resolve_address(&read.uri)?;
                debug!(request_id = %id, uri = %read.uri, resource = %resource.name, phase = "executing", "Reading resource");
                let contents = resource.handler.read(&read.uri, &vars).await?;
                Ok(json!({ "contents": [contents] }))
            }
            "prompts/list" => Ok(json!({
                "prompts": self.registry.prompts().iter().map(|p| p.definition()).collect::<Vec<_>>()
            })),
            "prompts/get" => {
                let get: GetPromptParams = parse_params(params)?;
                let prompt = self
                    .registry
                    .prompt(&get.name)
                    .ok_or_else(|| Error::MethodNotFound(get.name.clone()))?;
                debug!(request_id = %id, prompt = %prompt.name, phase = "validating", "Checking prompt arguments");
                prompt.check_arguments(&get.arguments)?;
                let messages = prompt.handler.render(&get.arguments).await?;
                Ok(json!({ "description": prompt.description, "messages": messages }))
            }
            "completion/complete" => self.complete(parse_params(params)?).await,
            method => match self.registry.tool(method) {
                Some(tool) => self.run_tool(tool, id, params, "params", outbound).await,
                None => Err(Error::MethodNotFound(method.to_string())),
            },
        }
    }

    fn initialize(&self, params: &Value) -> Value {
        let elicitation = params
            .pointer("/capabilities/elicitation")
            .is_some_and(|v| !v.is_null());
        self.supports_elicitation.store(elicitation, Ordering::Release);
        let client = params
            .pointer("/clientInfo/name")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        let client_protocol = params
            .get("protocolVersion")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        info!(client, client_protocol, elicitation, "Client connected");

        json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {
                "tools": { "listChanged": false },
                "resources": { "subscribe": false, "listChanged": false },
                "prompts": { "listChanged": false },
                "completions": {},
            },
            "serverInfo": {
                "name": SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION"),
            },
        })
    }

    async fn run_tool(
        &self,
        tool: &ToolDescriptor,
        id: RequestId,
        args: Value,
        root: &str,
        outbound: &Outbound,
    ) -> Result<Value> {
        debug!(request_id = %id, tool = %tool.name, phase = "validating", "Validating arguments");
        tool.input.check(&args, root).map_err(Error::InvalidParams)?;

        debug!(request_id = %id, tool = %tool.name, phase = "executing", "Executing tool");
        let client = ClientRequester::new(
            outbound.clone(),
            Arc::clone(&self.pending),
            self.supports_elicitation.load(Ordering::Acquire),
            self.elicitation_timeout,
        );
        let ctx = RequestContext::new(id, outbound.clone(), client);
        let value = tool.handler.call(args, ctx).await?;

        if let Some(output) = &tool.output {
            output.check(&value, "result").map_err(|violation| {
                Error::Internal(format!(
                    "tool '{}' broke its output schema: {violation}",
                    tool.name
                ))
            })?;
        }
        Ok(value)
    }

    async fn complete(&self, params: CompleteParams) -> Result<Value> {
        let prefix = params.argument.value.as_str();
        let mut values = match &params.reference {
            CompletionRef::Prompt { name } => {
                let prompt = self
                    .registry
                    .prompt(name)
                    .ok_or_else(|| Error::MethodNotFound(name.clone()))?;
                prompt.handler.complete(&params.argument.name, prefix).await
            }
            CompletionRef::Resource { uri } => {
                let resource = self
                    .registry
                    .resource_template(uri)
                    .ok_or_else(|| Error::ResourceNotFound(uri.clone()))?;
                resource.handler.complete(&params.argument.name, prefix).await
            }
        };

        let total = values.len();
        values.truncate(MAX_COMPLETIONS);
        Ok(json!({
            "completion": {
                "values": values,
                "total": total,
                "hasMore": total > MAX_COMPLETIONS,
            }
        }))
    }
}
