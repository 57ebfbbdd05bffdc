use std::path::PathBuf;

use thiserror::Error;

use crate::mcp::protocol::ErrorCode;
use crate::mcp::registry::Capability;

/// Exit status for a malformed envelope on the input stream (`EX_DATAERR`).
pub const EXIT_DATA_ERROR: u8 = 65;

/// Exit status for any other fatal fault (`EX_SOFTWARE`).
pub const EXIT_INTERNAL_ERROR: u8 = 70;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Malformed envelope: {0}")]
    Decode(String),

    #[error("Duplicate {capability} registration: {name}")]
    DuplicateRegistration { capability: Capability, name: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// Caller-facing validation or business-rule failure. The message is
    /// shown to the caller verbatim.
    #[error("{0}")]
    InvalidParams(String),

    #[error("{0}")]
    Overflow(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Request timed out after {0}ms")]
    Timeout(u64),

    #[error("Elicitation failed: {0}")]
    Elicitation(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Unexpected error: {0}")]
    Unexpected(#[from] anyhow::Error),
}

impl Error {
    pub fn error_code(&self) -> i32 {
        self.kind().code()
    }

    /// Wire classification of this error.
    pub fn kind(&self) -> ErrorCode {
        match self {
            Error::InvalidRequest(_) => ErrorCode::InvalidRequest,
            Error::MethodNotFound(_) => ErrorCode::MethodNotFound,
            Error::InvalidParams(_) | Error::Overflow(_) => ErrorCode::InvalidParams,
            Error::ResourceNotFound(_) => ErrorCode::ResourceNotFound,
            Error::Timeout(_) => ErrorCode::RequestTimeout,
            Error::Decode(_) => ErrorCode::ParseError,
            Error::Io(_)
            | Error::Json(_)
            | Error::Config(_)
            | Error::DuplicateRegistration { .. }
            | Error::Elicitation(_)
            | Error::Internal(_)
            | Error::Unexpected(_) => ErrorCode::InternalError,
        }
    }

    /// True when the caller can act on the error (bad input, unknown name).
    pub fn is_caller_error(&self) -> bool {
        !matches!(self.kind(), ErrorCode::InternalError)
    }

    /// Message safe to put on the wire. Internal faults collapse to the
    /// generic text so their detail only reaches the log.
    pub fn wire_message(&self) -> String {
        if self.is_caller_error() {
            self.to_string()
        } else {
            ErrorCode::InternalError.default_message().to_string()
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            Error::Decode(_) => EXIT_DATA_ERROR,
            _ => EXIT_INTERNAL_ERROR,
        }
    }
}

/// Errors that can occur while loading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file: {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration file: {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("configuration file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("configuration validation failed: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::MethodNotFound("x".into()).error_code(), -32601);
        assert_eq!(Error::InvalidParams("x".into()).error_code(), -32602);
        assert_eq!(Error::Overflow("x".into()).error_code(), -32602);
        assert_eq!(Error::ResourceNotFound("x".into()).error_code(), -32002);
        assert_eq!(Error::InvalidRequest("x".into()).error_code(), -32600);
        assert_eq!(Error::Internal("x".into()).error_code(), -32603);
        assert_eq!(Error::Timeout(10).error_code(), -32001);
    }

    #[test]
    fn test_invalid_params_message_is_verbatim() {
        let err = Error::InvalidParams("Division by zero".to_string());
        assert_eq!(err.wire_message(), "Division by zero");
    }

    #[test]
    fn test_internal_detail_never_reaches_wire_message() {
        let err = Error::Unexpected(anyhow::anyhow!("db password is hunter2"));
        assert_eq!(err.wire_message(), "Internal error");
        assert!(!err.is_caller_error());

        let err = Error::Internal("stack trace here".into());
        assert_eq!(err.wire_message(), "Internal error");
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(Error::Decode("bad".into()).exit_code(), 65);
        assert_eq!(Error::Internal("bad".into()).exit_code(), 70);
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed");
        assert_eq!(Error::from(io).exit_code(), 70);
    }

    #[test]
    fn config_error_display() {
        let error = ConfigError::NotFound {
            path: PathBuf::from("/path/to/config.json"),
        };
        let msg = error.to_string();
        assert!(msg.contains("not found"));
        assert!(msg.contains("config.json"));
    }
}
