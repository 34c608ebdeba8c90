//! ECP Server — routes JSON-RPC requests to adapters through a priority
//! middleware chain.
//!
//! The server owns the adapter registry, the middleware chain, and the
//! process-wide settings store, and provides the `RequestHandler`
//! implementation the transport layer dispatches into.

pub mod middleware;
pub mod registry;
pub mod router;
pub mod settings;

pub use registry::AdapterRegistry;
pub use router::ECPServer;
pub use settings::SettingsStore;
