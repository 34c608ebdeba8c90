//! ECP Transport Layer
//!
//! Provides the WebSocket transport for the ECP server.
//! The transport layer handles:
//! - Connection lifecycle (open, message, close)
//! - Authentication handshake
//! - Heartbeat / stale connection detection
//! - Origin validation on upgrade
//! - Notification broadcasting to authenticated clients
//!
//! The transport is decoupled from the server logic via the `RequestHandler` trait.

pub mod connection;
pub mod heartbeat;
pub mod origin;
pub mod server;

pub use connection::{ConnectionHandle, ConnectionId, ConnectionTable, OutboundMessage};
pub use origin::is_origin_allowed;
pub use server::{RequestHandler, TransportConfig, TransportServer};
