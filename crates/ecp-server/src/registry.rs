//! AdapterRegistry — routes a JSON-RPC method to the adapter registered for
//! the longest matching namespace prefix.
//!
//! This core has no notion of multiple open workspaces: one server process
//! serves one workspace root for its whole lifetime, so adapters are
//! registered once at startup and live for the process's duration.

use ecp_protocol::{ECPError, ECPErrorCode, HandlerResult};
use ecp_services::Service;
use serde_json::Value;
use tracing::info;

/// Object-safe wrapper for the [`Service`] trait — needed to hold a
/// `Vec<Box<dyn ServiceDyn>>` since `Service::handle` is an RPITIT method
/// and therefore not itself object-safe.
pub trait ServiceDyn: Send + Sync {
    fn namespace_dyn(&self) -> &str;

    fn handle_dyn<'a>(
        &'a self,
        method: &'a str,
        params: Option<Value>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = HandlerResult> + Send + 'a>>;

    fn init_dyn(
        &self,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), Box<dyn std::error::Error + Send + Sync>>> + Send + '_>>;

    fn shutdown_dyn(&self) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + '_>>;
}

impl<T: Service> ServiceDyn for T {
    fn namespace_dyn(&self) -> &str {
        self.namespace()
    }
    fn handle_dyn<'a>(
        &'a self,
        method: &'a str,
        params: Option<Value>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = HandlerResult> + Send + 'a>> {
        Box::pin(self.handle(method, params))
    }
    fn init_dyn(
        &self,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), Box<dyn std::error::Error + Send + Sync>>> + Send + '_>> {
        Box::pin(self.init())
    }
    fn shutdown_dyn(&self) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + '_>> {
        Box::pin(self.shutdown())
    }
}

/// A flat registry of adapters, routing by longest matching namespace
/// prefix. Registration order breaks ties between equal-length prefixes,
/// so register more specific adapters before more general ones.
pub struct AdapterRegistry {
    adapters: Vec<Box<dyn ServiceDyn>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self { adapters: Vec::new() }
    }

    pub fn register<S: Service + 'static>(&mut self, adapter: S) {
        info!(namespace = adapter.namespace(), "registering adapter");
        self.adapters.push(Box::new(adapter));
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Whether `prefix` is a genuine namespace prefix of `method`: either
    /// an exact match, or followed by a `/` separator (so `"file"` matches
    /// `"file/read"` but not `"filesystem/read"`).
    fn prefix_matches(prefix: &str, method: &str) -> bool {
        method == prefix || method.strip_prefix(prefix).is_some_and(|rest| rest.starts_with('/'))
    }

    /// Find the adapter registered for the longest namespace prefix of
    /// `method`. Ties (equal-length prefixes) are resolved by whichever
    /// adapter was registered first.
    fn find(&self, method: &str) -> Option<&dyn ServiceDyn> {
        self.adapters
            .iter()
            .filter(|a| Self::prefix_matches(a.namespace_dyn(), method))
            .max_by_key(|a| a.namespace_dyn().len())
            .map(|b| b.as_ref())
    }

    pub async fn route(&self, method: &str, params: Option<Value>) -> HandlerResult {
        match self.find(method) {
            Some(adapter) => adapter.handle_dyn(method, params).await,
            None => Err(ECPError::method_not_found(method)),
        }
    }

    pub async fn init_all(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        for adapter in &self.adapters {
            adapter.init_dyn().await?;
        }
        Ok(())
    }

    pub async fn shutdown_all(&self) {
        for adapter in &self.adapters {
            adapter.shutdown_dyn().await;
        }
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stub(&'static str);

    impl Service for Stub {
        fn namespace(&self) -> &str {
            self.0
        }

        async fn handle(&self, method: &str, _params: Option<Value>) -> HandlerResult {
            Ok(serde_json::json!({ "handledBy": self.0, "method": method }))
        }
    }

    #[tokio::test]
    async fn routes_to_exact_namespace() {
        let mut reg = AdapterRegistry::new();
        reg.register(Stub("file"));
        reg.register(Stub("terminal"));
        let result = reg.route("file/read", None).await.unwrap();
        assert_eq!(result["handledBy"], "file");
    }

    #[tokio::test]
    async fn unknown_namespace_is_method_not_found() {
        let reg = AdapterRegistry::new();
        let err = reg.route("nope/op", None).await.unwrap_err();
        assert_eq!(err.error_code(), ECPErrorCode::MethodNotFound);
    }

    #[tokio::test]
    async fn longer_prefix_wins_over_shorter() {
        let mut reg = AdapterRegistry::new();
        reg.register(Stub("file"));
        reg.register(Stub("file/search"));
        let result = reg.route("file/search/text", None).await.unwrap();
        assert_eq!(result["handledBy"], "file/search");
    }

    #[test]
    fn prefix_does_not_match_on_bare_string_overlap() {
        assert!(!AdapterRegistry::prefix_matches("file", "filesystem/read"));
        assert!(AdapterRegistry::prefix_matches("file", "file/read"));
        assert!(AdapterRegistry::prefix_matches("file", "file"));
    }
}
