//! ECP authentication types for the WebSocket handshake protocol.
//!
//! Protocol flow:
//!   1. Client connects to ws://host:port/ws
//!   2. Server sends: { method: "auth/required", params: { serverVersion, timeout } }
//!   3. Client sends: { method: "auth/handshake", id: "...", params: { token, client } }
//!   4. Server validates token and responds
//!   5. Normal JSON-RPC traffic begins
//!
//! Legacy clients may instead pass `?token=...` on the upgrade request; on
//! success the server skips straight to `Authenticated` and sends
//! `server/connected` instead of requiring the explicit handshake above.

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Client → Server
// ─────────────────────────────────────────────────────────────────────────────

/// Client information sent during handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeClientInfo {
    /// Client type identifier (e.g., "desktop", "headless-cli", "agent")
    pub name: String,
    /// Client version
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Parameters for the auth/handshake request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeParams {
    /// The authentication token (shared secret)
    pub token: String,
    /// Optional client information
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<HandshakeClientInfo>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Server → Client
// ─────────────────────────────────────────────────────────────────────────────

/// Parameters for the auth/required notification (sent on connect).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRequiredParams {
    /// Server version
    #[serde(rename = "serverVersion")]
    pub server_version: String,
    /// Milliseconds until unauthenticated connection is closed
    pub timeout: u64,
}

/// Successful handshake response result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeResult {
    /// Unique client ID for this connection
    #[serde(rename = "clientId")]
    pub client_id: String,
    /// Session identifier, a 32-character lowercase hex string
    #[serde(rename = "sessionId")]
    pub session_id: String,
    /// Server version
    #[serde(rename = "serverVersion")]
    pub server_version: String,
    /// Workspace root path
    #[serde(rename = "workspaceRoot", skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection State
// ─────────────────────────────────────────────────────────────────────────────

/// Authentication state for a client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Pending,
    Authenticated,
    Rejected,
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Authentication configuration for the server. Process-wide and immutable
/// after server start.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Static auth token (shared secret)
    pub token: String,
    /// Timeout for completing auth handshake in ms (default: 10000)
    pub handshake_timeout_ms: u64,
    /// Allow legacy query-param auth (?token=...)
    pub allow_legacy_auth: bool,
    /// Heartbeat interval in ms (default: 30000). 0 to disable.
    pub heartbeat_interval_ms: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            handshake_timeout_ms: 10_000,
            allow_legacy_auth: true,
            heartbeat_interval_ms: 30_000,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Error Codes
// ─────────────────────────────────────────────────────────────────────────────

/// Authentication-specific error codes (-32010 to -32019).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorCode {
    /// Client is not authenticated
    NotAuthenticated,
    /// Invalid or missing auth token
    InvalidToken,
    /// Auth handshake timed out
    HandshakeTimeout,
    /// Connection rejected
    ConnectionRejected,
}

impl AuthErrorCode {
    pub fn code(&self) -> i32 {
        match self {
            Self::NotAuthenticated => -32010,
            Self::InvalidToken => -32011,
            Self::HandshakeTimeout => -32012,
            Self::ConnectionRejected => -32013,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Constant-time token comparison
// ─────────────────────────────────────────────────────────────────────────────

/// Compare two tokens without leaking timing information about where (or
/// whether) they differ.
///
/// Lengths are checked first — a length mismatch is itself observable, the
/// spec only asks that content comparison not add an additional signal —
/// but even on a length mismatch the function still walks the full length
/// of the longer input against a zero byte, so a caller who can only time
/// this function (and not separately observe the length check) cannot use
/// runtime to learn how many leading bytes matched. On equal lengths, every
/// byte pair is XORed and accumulated into a single sentinel that is tested
/// only once, at the very end.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    let len_match = a.len() == b.len();
    let longer = a.len().max(b.len());

    let mut diff: u8 = 0;
    for i in 0..longer {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        diff |= x ^ y;
    }

    len_match && diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_tokens_match() {
        assert!(constant_time_eq("abc123", "abc123"));
    }

    #[test]
    fn different_tokens_of_same_length_do_not_match() {
        assert!(!constant_time_eq("abc123", "abc124"));
    }

    #[test]
    fn different_length_tokens_do_not_match() {
        assert!(!constant_time_eq("short", "a-lot-longer-token"));
        assert!(!constant_time_eq("a-lot-longer-token", "short"));
    }

    #[test]
    fn empty_tokens() {
        assert!(constant_time_eq("", ""));
        assert!(!constant_time_eq("", "x"));
    }
}
