//! JSON-RPC 2.0 base types for ECP.

use serde::{Deserialize, Serialize};

use crate::error::ECPError;

/// JSON-RPC 2.0 request ID — either a string or integer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Number(i64),
}

/// Caller identity — either a human user or an AI agent. Server-asserted;
/// never taken from request params (see `ecp_protocol::context`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ECPCaller {
    #[serde(rename = "human")]
    Human,
    #[serde(rename = "agent")]
    Agent {
        #[serde(rename = "agentId")]
        agent_id: String,
        #[serde(rename = "executionId", skip_serializing_if = "Option::is_none")]
        execution_id: Option<String>,
        #[serde(rename = "roleType", skip_serializing_if = "Option::is_none")]
        role_type: Option<String>,
    },
}

impl ECPCaller {
    /// `agent_id` of this caller, if it's an agent.
    pub fn agent_id(&self) -> Option<&str> {
        match self {
            Self::Human => None,
            Self::Agent { agent_id, .. } => Some(agent_id),
        }
    }

    /// `role_type` of this caller, if it's an agent and one was asserted.
    pub fn role_type(&self) -> Option<&str> {
        match self {
            Self::Human => None,
            Self::Agent { role_type, .. } => role_type.as_deref(),
        }
    }

    pub fn is_human(&self) -> bool {
        matches!(self, Self::Human)
    }
}

/// JSON-RPC 2.0 request. `id` is absent for notifications, which never
/// expect a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ECPRequest {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl ECPRequest {
    /// A request with no `id` is a notification: it is processed but never
    /// answered.
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// JSON-RPC 2.0 success response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ECPSuccessResponse {
    pub jsonrpc: String,
    pub id: RequestId,
    pub result: serde_json::Value,
}

/// JSON-RPC 2.0 error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ECPErrorResponse {
    pub jsonrpc: String,
    pub id: Option<RequestId>,
    pub error: ECPError,
}

/// JSON-RPC 2.0 response (success or error).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ECPResponse {
    Success(ECPSuccessResponse),
    Error(ECPErrorResponse),
}

/// JSON-RPC 2.0 notification (no id, no response expected).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ECPNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

/// Result from a service adapter handler.
pub type HandlerResult = Result<serde_json::Value, ECPError>;

// ─────────────────────────────────────────────────────────────────────────────
// Helper constructors
// ─────────────────────────────────────────────────────────────────────────────

impl ECPSuccessResponse {
    pub fn new(id: RequestId, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result,
        }
    }
}

impl ECPErrorResponse {
    pub fn new(id: Option<RequestId>, error: ECPError) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            error,
        }
    }
}

impl ECPNotification {
    pub fn new(method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            method: method.into(),
            params,
        }
    }
}

impl ECPResponse {
    pub fn success(id: RequestId, result: serde_json::Value) -> Self {
        Self::Success(ECPSuccessResponse::new(id, result))
    }

    pub fn error(id: Option<RequestId>, error: ECPError) -> Self {
        Self::Error(ECPErrorResponse::new(id, error))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}
