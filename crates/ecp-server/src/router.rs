//! ECP Server — ties the adapter registry, middleware chain, and settings
//! store together behind the transport crate's `RequestHandler` contract.

use std::path::PathBuf;

use ecp_protocol::context::{MiddlewareContext, RequestContext};
use ecp_protocol::{ECPError, ECPNotification, HandlerResult};
use ecp_transport::server::RequestHandler;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::info;

use crate::middleware::{ChainResult, MiddlewareChain};
use crate::registry::AdapterRegistry;
use crate::settings::SettingsStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServerState {
    Uninitialized,
    Running,
    Shutdown,
}

/// The ECP server core: owns the adapter registry, the middleware chain,
/// and the settings store, and dispatches each inbound request through
/// `middleware -> adapter -> afterExecute`.
pub struct ECPServer {
    workspace_root: PathBuf,
    registry: AdapterRegistry,
    middleware: MiddlewareChain,
    settings: std::sync::Arc<SettingsStore>,
    state: ServerState,
    notification_tx: Option<broadcast::Sender<String>>,
}

impl ECPServer {
    pub fn new(workspace_root: PathBuf) -> Self {
        let settings = std::sync::Arc::new(SettingsStore::new());
        let mut middleware = MiddlewareChain::new();
        middleware.add(crate::middleware::SettingsSnapshotMiddleware::new(settings.clone()));
        middleware.add(crate::middleware::CallerTelemetryMiddleware);
        middleware.add(crate::middleware::WorkingSetGovernanceMiddleware);
        middleware.add(crate::middleware::ValidationMiddleware::new());

        Self {
            workspace_root,
            registry: AdapterRegistry::new(),
            middleware,
            settings,
            state: ServerState::Uninitialized,
            notification_tx: None,
        }
    }

    pub fn register_adapter<S: ecp_services::Service + 'static>(&mut self, adapter: S) {
        self.registry.register(adapter);
    }

    pub fn settings(&self) -> std::sync::Arc<SettingsStore> {
        self.settings.clone()
    }

    pub fn set_notification_sender(&mut self, tx: broadcast::Sender<String>) {
        self.notification_tx = Some(tx);
    }

    pub async fn initialize(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!(workspace_root = %self.workspace_root.display(), adapters = self.registry.len(), "initializing ECP server");
        self.registry.init_all().await?;
        self.state = ServerState::Running;
        Ok(())
    }

    pub async fn shutdown(&mut self) {
        if self.state == ServerState::Shutdown {
            return;
        }
        info!("shutting down ECP server");
        self.state = ServerState::Shutdown;
        self.registry.shutdown_all().await;
    }

    pub fn emit_notification(&self, method: &str, params: Option<Value>) {
        if let Some(tx) = &self.notification_tx {
            let notification = ECPNotification::new(method, params);
            if let Ok(json) = serde_json::to_string(&notification) {
                let _ = tx.send(json);
            }
        }
    }

    pub fn workspace_root(&self) -> &std::path::Path {
        &self.workspace_root
    }
}

impl RequestHandler for ECPServer {
    async fn handle_request(
        &self,
        method: &str,
        params: Option<Value>,
        ctx: RequestContext,
    ) -> HandlerResult {
        match self.state {
            ServerState::Shutdown => return Err(ECPError::shutting_down()),
            ServerState::Uninitialized => return Err(ECPError::not_initialized()),
            ServerState::Running => {}
        }

        let asserted_caller = ctx.resolve_caller();
        let mut mw_ctx = MiddlewareContext::new(
            method,
            params,
            self.workspace_root.clone(),
            ctx.session_id.clone(),
            Some(ctx.client_id.clone()),
            asserted_caller,
        );

        match self.middleware.run_before(&mut mw_ctx).await {
            ChainResult::Blocked { blocked_by, error_code, feedback, error_data } => {
                info!(method, blocked_by, "request blocked by middleware");
                return Err(ECPError::policy(error_code, feedback, error_data));
            }
            ChainResult::Allowed => {}
        }

        let result = self.registry.route(method, mw_ctx.params.clone()).await;

        if let Ok(ref value) = result {
            self.middleware.run_after(&mw_ctx, value).await;
        }

        result
    }
}
