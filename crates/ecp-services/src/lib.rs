//! ECP adapter implementations.
//!
//! Each adapter implements the [`Service`] trait and handles a namespace of
//! JSON-RPC methods. The registry in `ecp-server` routes to the adapter
//! registered for the longest matching namespace prefix.

pub mod document;
pub mod file;
pub mod secret;
pub mod session;
pub mod terminal;

use ecp_protocol::HandlerResult;

/// Whether an adapter is global (shared process-wide) or workspace-scoped.
/// This core runs a single workspace per process, so in practice every
/// adapter is `Workspace`-scoped; the distinction is kept because it's
/// meaningful to an adapter's own internal bookkeeping (e.g. whether it
/// needs to track a workspace root at all).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceScope {
    Global,
    Workspace,
}

/// Trait implemented by every ECP adapter.
///
/// Each adapter handles a namespace of methods (e.g. `"file"`, `"terminal"`).
/// The registry does not strip the namespace prefix — `handle` receives the
/// full method string and is responsible for matching on it.
pub trait Service: Send + Sync {
    /// The namespace prefix this adapter handles (e.g. `"file"`, `"terminal"`).
    fn namespace(&self) -> &str;

    fn scope(&self) -> ServiceScope {
        ServiceScope::Workspace
    }

    /// Handle a JSON-RPC request within this adapter's namespace.
    fn handle(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> impl std::future::Future<Output = HandlerResult> + Send;

    /// Initialize the adapter (called once at startup).
    fn init(&self) -> impl std::future::Future<Output = Result<(), Box<dyn std::error::Error + Send + Sync>>> + Send {
        async { Ok(()) }
    }

    /// Shut the adapter down (called once at server shutdown).
    fn shutdown(&self) -> impl std::future::Future<Output = ()> + Send {
        async {}
    }
}
