//! ECP error types and the full error-code bands the core allocates.
//!
//! Bands: JSON-RPC standard (`-32700..-32603`), server status
//! (`-32000..-32002`), middleware (`-32003..-32005`), auth
//! (`-32010..-32013`). Adapters may allocate further bands above
//! `-32500` but those are opaque to this crate.

use serde::{Deserialize, Serialize};

/// All error codes the core itself allocates meaning to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ECPErrorCode {
    // JSON-RPC 2.0 standard errors
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,

    // Server errors
    ServerError,
    ServerNotInitialized,
    ServerShuttingDown,

    // Middleware (policy) errors — chosen per rejecting middleware
    ValidationFailed,
    LintFailed,
    RuleViolation,

    // Auth state machine errors
    NotAuthenticated,
    InvalidToken,
    HandshakeTimeout,
    ConnectionRejected,

    // Custom / adapter-allocated code, passed through verbatim
    Custom(i32),
}

impl ECPErrorCode {
    pub fn code(&self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::ServerError => -32000,
            Self::ServerNotInitialized => -32001,
            Self::ServerShuttingDown => -32002,
            Self::ValidationFailed => -32003,
            Self::LintFailed => -32004,
            Self::RuleViolation => -32005,
            Self::NotAuthenticated => -32010,
            Self::InvalidToken => -32011,
            Self::HandshakeTimeout => -32012,
            Self::ConnectionRejected => -32013,
            Self::Custom(c) => *c,
        }
    }

    pub fn from_code(code: i32) -> Self {
        match code {
            -32700 => Self::ParseError,
            -32600 => Self::InvalidRequest,
            -32601 => Self::MethodNotFound,
            -32602 => Self::InvalidParams,
            -32603 => Self::InternalError,
            -32000 => Self::ServerError,
            -32001 => Self::ServerNotInitialized,
            -32002 => Self::ServerShuttingDown,
            -32003 => Self::ValidationFailed,
            -32004 => Self::LintFailed,
            -32005 => Self::RuleViolation,
            -32010 => Self::NotAuthenticated,
            -32011 => Self::InvalidToken,
            -32012 => Self::HandshakeTimeout,
            -32013 => Self::ConnectionRejected,
            c => Self::Custom(c),
        }
    }
}

/// JSON-RPC 2.0 error object, also the crate's error type for anything that
/// ultimately has to be reported back over the wire.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("ECP error [{code}]: {message}")]
pub struct ECPError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ECPError {
    pub fn new(code: ECPErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(ECPErrorCode::ParseError, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ECPErrorCode::InvalidRequest, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(ECPErrorCode::MethodNotFound, format!("Method not found: {method}"))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ECPErrorCode::InvalidParams, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ECPErrorCode::InternalError, message)
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(ECPErrorCode::ServerError, message)
    }

    pub fn not_initialized() -> Self {
        Self::new(ECPErrorCode::ServerNotInitialized, "Server is not initialized")
    }

    pub fn shutting_down() -> Self {
        Self::new(ECPErrorCode::ServerShuttingDown, "Server is shutting down")
    }

    /// Construct a policy (middleware) rejection. `code` must be one of the
    /// `-32003..-32005` band; `message` is the human-readable feedback,
    /// `data` the machine-readable context (e.g. `{code: "OUTSIDE_WORKING_SET", ...}`).
    pub fn policy(code: ECPErrorCode, message: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        let mut err = Self::new(code, message);
        err.data = data;
        err
    }

    pub fn not_authenticated() -> Self {
        Self::new(ECPErrorCode::NotAuthenticated, "Not authenticated")
    }

    pub fn invalid_token() -> Self {
        Self::new(ECPErrorCode::InvalidToken, "Authentication failed: invalid token")
    }

    pub fn handshake_timeout() -> Self {
        Self::new(ECPErrorCode::HandshakeTimeout, "Authentication handshake timed out")
    }

    pub fn error_code(&self) -> ECPErrorCode {
        ECPErrorCode::from_code(self.code)
    }
}
