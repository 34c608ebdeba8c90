//! ECP (Editor Command Protocol) - Protocol Types
//!
//! JSON-RPC 2.0 compatible types for the Editor Command Protocol.
//! This crate is the single source of truth for all protocol types,
//! method names, notification names, and error codes.

pub mod auth;
pub mod context;
pub mod error;
pub mod jsonrpc;
pub mod methods;
pub mod notifications;

pub use auth::{
    constant_time_eq, AuthConfig, AuthErrorCode, AuthRequiredParams, AuthState,
    HandshakeClientInfo, HandshakeParams, HandshakeResult,
};
pub use context::{MiddlewareContext, RequestContext};
pub use error::{ECPError, ECPErrorCode};
pub use jsonrpc::{
    ECPCaller, ECPErrorResponse, ECPNotification, ECPRequest, ECPResponse,
    ECPSuccessResponse, HandlerResult, RequestId,
};
pub use methods::{is_known_method, namespace_of, MethodName, Methods};
pub use notifications::{NotificationName, Notifications};
