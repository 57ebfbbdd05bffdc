//! JSON-RPC 2.0 envelopes exchanged over stdio.
//!
//! - **Request**: has `method` and `id`, expects exactly one response
//! - **Notification**: has `method`, no `id`, never answered
//! - **Response**: has `id` and either `result` or `error`
//!
//! Request ids are strings or integers, never `null`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

pub const JSONRPC_VERSION: &str = "2.0";

/// The MCP protocol revision announced during `initialize`.
pub const MCP_PROTOCOL_VERSION: &str = "2025-06-18";

pub const SERVER_NAME: &str = "math_mcp";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// A response sent by the client to a server-initiated request.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcClientResponse {
    pub jsonrpc: String,
    pub id: RequestId,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcErrorData>,
}

#[derive(Debug, Clone)]
pub enum IncomingMessage {
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
    Response(JsonRpcClientResponse),
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    pub id: RequestId,
    pub result: Value,
}

impl JsonRpcResponse {
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    /// The addressed resource or history entry does not exist.
    ResourceNotFound,
    RequestTimeout,
}

impl ErrorCode {
    pub const fn code(self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::ResourceNotFound => -32002,
            Self::RequestTimeout => -32001,
        }
    }

    pub const fn default_message(self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid Request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
            Self::ResourceNotFound => "Resource not found",
            Self::RequestTimeout => "Request timed out",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcErrorData {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcErrorData {
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }
}

/// An error response. `id` is `null` only when the request id is unknown.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    pub jsonrpc: &'static str,
    pub id: Option<RequestId>,
    pub error: JsonRpcErrorData,
}

impl JsonRpcError {
    pub fn new(id: Option<RequestId>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            error: JsonRpcErrorData::with_message(code, message),
        }
    }

    pub fn parse_error() -> Self {
        Self::new(None, ErrorCode::ParseError, ErrorCode::ParseError.default_message())
    }

    pub fn from_error(id: RequestId, err: &crate::Error) -> Self {
        Self::new(Some(id), err.kind(), err.wire_message())
    }
}

/// A server-to-client notification.
#[derive(Debug, Clone, Serialize)]
pub struct OutgoingNotification {
    pub jsonrpc: &'static str,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl OutgoingNotification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method: method.into(),
            params,
        }
    }

    /// Progress of the request identified by `request_id`, in percent.
    pub fn progress(request_id: &RequestId, percent: u8, message: Option<&str>) -> Self {
        let mut params = Map::new();
        params.insert("progressToken".to_string(), json!(request_id));
        params.insert("progress".to_string(), json!(percent.min(100)));
        params.insert("total".to_string(), json!(100));
        if let Some(message) = message {
            params.insert("message".to_string(), json!(message));
        }
        Self::new("notifications/progress", Some(Value::Object(params)))
    }
}

/// A server-to-client request, e.g. `elicitation/create`.
#[derive(Debug, Clone, Serialize)]
pub struct OutgoingRequest {
    pub jsonrpc: &'static str,
    pub id: RequestId,
    pub method: String,
    pub params: Value,
}

impl OutgoingRequest {
    pub fn new(id: RequestId, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method: method.into(),
            params,
        }
    }
}

/// A line that is not a well-formed envelope.
#[derive(Debug, Clone, Error)]
#[error("{reason}")]
pub struct DecodeError {
    pub reason: String,
}

impl DecodeError {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl From<DecodeError> for crate::Error {
    fn from(err: DecodeError) -> Self {
        crate::Error::Decode(err.reason)
    }
}

/// Classifies one line of input.
pub fn parse_message(line: &str) -> Result<IncomingMessage, DecodeError> {
    let value: Value =
        serde_json::from_str(line).map_err(|e| DecodeError::new(format!("invalid JSON: {e}")))?;

    let obj = value
        .as_object()
        .ok_or_else(|| DecodeError::new("envelope is not a JSON object"))?;

    match obj.get("jsonrpc").and_then(Value::as_str) {
        Some(JSONRPC_VERSION) => {}
        _ => return Err(DecodeError::new("missing or unsupported jsonrpc version")),
    }

    if matches!(obj.get("id"), Some(Value::Null)) {
        return Err(DecodeError::new("id must be a string or an integer"));
    }

    if let Some(method) = obj.get("method") {
        match method.as_str() {
            Some(m) if !m.is_empty() => {}
            _ => return Err(DecodeError::new("method must be a non-empty string")),
        }

        return if obj.contains_key("id") {
            serde_json::from_value(value)
                .map(IncomingMessage::Request)
                .map_err(|e| DecodeError::new(format!("invalid request: {e}")))
        } else {
            serde_json::from_value(value)
                .map(IncomingMessage::Notification)
                .map_err(|e| DecodeError::new(format!("invalid notification: {e}")))
        };
    }

    if obj.contains_key("id") && (obj.contains_key("result") || obj.contains_key("error")) {
        return serde_json::from_value(value)
            .map(IncomingMessage::Response)
            .map_err(|e| DecodeError::new(format!("invalid response: {e}")));
    }

    Err(DecodeError::new("envelope has neither a method nor a result"))
}
