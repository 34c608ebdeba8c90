//! The process-wide settings store consulted by the Settings Snapshot
//! middleware. Not an adapter — governance configuration is core server
//! behaviour, not a black-box service, so it lives here rather than in
//! `ecp-services`.
//!
//! Holds a flat `HashMap<String, Value>` keyed by dotted path
//! (`governance.workingSet.project`, …) rather than a typed struct, matching
//! the metadata bag's own untyped-in-the-abstract design — the snapshot
//! middleware copies this wholesale into `MiddlewareContext::settings`.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde_json::{json, Value};

/// Defaults matching the governance policy described for Working-Set
/// Governance: enforcement off, empty project/bypass lists, no session
/// override.
fn default_settings() -> HashMap<String, Value> {
    let mut s = HashMap::new();
    s.insert(
        "governance".to_string(),
        json!({
            "workingSet": {
                "enforcementEnabled": false,
                "project": Vec::<String>::new(),
                "bypass": {
                    "agentIds": Vec::<String>::new(),
                    "roleTypes": Vec::<String>::new(),
                },
            },
        }),
    );
    s
}

/// A process-wide, runtime-mutable settings store. Reads are lock-free
/// aside from the `RwLock`'s read path; writes are rare (operator
/// reconfiguration), reads happen on every request via the Settings
/// Snapshot middleware.
pub struct SettingsStore {
    values: RwLock<HashMap<String, Value>>,
}

impl SettingsStore {
    pub fn new() -> Self {
        Self {
            values: RwLock::new(default_settings()),
        }
    }

    /// A full snapshot as a single JSON object, for the Settings Snapshot
    /// middleware to write into `metadata.settings`.
    pub fn snapshot(&self) -> Value {
        Value::Object(self.values.read().clone().into_iter().collect())
    }

    /// Merge a dotted-path key into the store, replacing whatever was
    /// there. Used by the bootstrap CLI to turn `--workspace`-scoped flags
    /// into governance config, and by tests to exercise policy paths.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.values.write().insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.read().get(key).cloned()
    }
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::new()
    }
}
