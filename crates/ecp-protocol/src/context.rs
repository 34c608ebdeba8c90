//! Middleware context — the per-request record threaded through the
//! middleware chain and into the dispatched adapter call.
//!
//! Built once per request by the dispatch pipeline from the owning
//! connection's local state (never from request params), passed by
//! reference to each middleware in priority order, and consumed by the
//! adapter call at the end of the chain. Two metadata keys are reserved:
//! `settings`, written once by the settings-snapshot middleware, and
//! `caller`, the server-asserted identity of the request originator. Both
//! get typed accessors below rather than being looked up as raw strings
//! at every call site.

use std::collections::HashMap;
use std::path::PathBuf;

use serde_json::Value;

use crate::auth::HandshakeClientInfo;
use crate::jsonrpc::ECPCaller;

const KEY_SETTINGS: &str = "settings";
const KEY_CALLER: &str = "caller";

/// Per-request context passed through the middleware chain.
#[derive(Debug, Clone)]
pub struct MiddlewareContext {
    pub method: String,
    pub params: Option<Value>,
    pub workspace_root: PathBuf,
    pub session_id: Option<String>,
    pub client_id: Option<String>,
    /// The server-asserted caller identity for the owning connection,
    /// supplied by the router from trusted connection state (never from
    /// `params`). The settings-snapshot middleware mirrors this into
    /// `metadata.caller`; it is carried as its own field rather than only
    /// living in metadata so it is available before that middleware runs.
    asserted_caller: ECPCaller,
    metadata: HashMap<String, Value>,
}

impl MiddlewareContext {
    pub fn new(
        method: impl Into<String>,
        params: Option<Value>,
        workspace_root: PathBuf,
        session_id: Option<String>,
        client_id: Option<String>,
        asserted_caller: ECPCaller,
    ) -> Self {
        Self {
            method: method.into(),
            params,
            workspace_root,
            session_id,
            client_id,
            asserted_caller,
            metadata: HashMap::new(),
        }
    }

    pub fn asserted_caller(&self) -> &ECPCaller {
        &self.asserted_caller
    }

    /// Replace `params` with a middleware-modified value (`modifiedParams`).
    pub fn set_params(&mut self, params: Value) {
        self.params = Some(params);
    }

    pub fn metadata(&self) -> &HashMap<String, Value> {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut HashMap<String, Value> {
        &mut self.metadata
    }

    pub fn get_metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
    }

    /// Settings snapshot written by the settings-snapshot middleware. `None`
    /// until that middleware has run (it has the lowest priority number of
    /// the core middlewares, so in practice this is always populated by the
    /// time a later middleware consults it).
    pub fn settings(&self) -> Option<&Value> {
        self.metadata.get(KEY_SETTINGS)
    }

    pub fn set_settings(&mut self, settings: Value) {
        self.metadata.insert(KEY_SETTINGS.to_string(), settings);
    }

    /// Read a boolean setting by dotted path (e.g.
    /// `governance.workingSet.enforcementEnabled`), defaulting to `false`
    /// when absent or not a bool.
    pub fn setting_bool(&self, dotted_path: &str) -> bool {
        let Some(mut cur) = self.settings() else { return false };
        for segment in dotted_path.split('.') {
            match cur.get(segment) {
                Some(v) => cur = v,
                None => return false,
            }
        }
        cur.as_bool().unwrap_or(false)
    }

    /// Read a setting by dotted path as an array of strings, if present.
    pub fn setting_str_array(&self, dotted_path: &str) -> Option<Vec<String>> {
        let mut cur = self.settings()?;
        for segment in dotted_path.split('.') {
            cur = cur.get(segment)?;
        }
        cur.as_array().map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
    }

    /// The server-asserted caller identity, mirrored into metadata by the
    /// settings-snapshot middleware. `None` until that middleware has run.
    pub fn caller(&self) -> Option<ECPCaller> {
        self.metadata
            .get(KEY_CALLER)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn set_caller(&mut self, caller: &ECPCaller) {
        if let Ok(v) = serde_json::to_value(caller) {
            self.metadata.insert(KEY_CALLER.to_string(), v);
        }
    }
}

/// Per-connection context handed to the router: identifiers the dispatch
/// pipeline needs to build a [`MiddlewareContext`] but that live on the
/// connection, not the request. The connection table holds connections by
/// id only for lookup — this is a plain value copied out per request, not a
/// reference into connection-owned state (see the transport crate's
/// `ConnectionHandle`).
///
/// `client_info` is the descriptor the peer reported once at handshake
/// time (`client: {name, version}`); it is connection-scoped trusted
/// state, not per-request params, so deriving a caller classification from
/// it (see `ECPCaller`) does not violate "caller is never taken from
/// request params" — that guarantee is about the individual business
/// request's own `params`, not the one-time handshake descriptor.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub client_id: String,
    pub session_id: Option<String>,
    pub client_info: Option<HandshakeClientInfo>,
}

impl RequestContext {
    /// Classify the connection's caller from its handshake client
    /// descriptor. A `client.name` containing "agent" (case-insensitive)
    /// is asserted as an agent caller, using the name itself as the agent
    /// id; anything else is a human caller. This is the server's own
    /// assertion, made once on the trusted handshake descriptor, not a
    /// value a request can forge through its `params`.
    pub fn resolve_caller(&self) -> ECPCaller {
        match &self.client_info {
            Some(info) if info.name.to_lowercase().contains("agent") => ECPCaller::Agent {
                agent_id: info.name.clone(),
                execution_id: None,
                role_type: None,
            },
            _ => ECPCaller::Human,
        }
    }
}
