//! Session adapter — `session/create`, `session/get`.
//!
//! A trivial in-memory store, process-lifetime only: enough for an
//! end-to-end test to produce a real session payload (e.g. a per-session
//! working-set override) without needing a persistence layer of its own.

use std::collections::HashMap;

use ecp_protocol::{ECPError, HandlerResult};
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::Service;

pub struct SessionService {
    sessions: RwLock<HashMap<String, Value>>,
}

impl SessionService {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for SessionService {
    fn default() -> Self {
        Self::new()
    }
}

impl Service for SessionService {
    fn namespace(&self) -> &str {
        "session"
    }

    async fn handle(&self, method: &str, params: Option<Value>) -> HandlerResult {
        match method {
            "session/create" => {
                let p: SessionCreateParams = parse_params_optional(params);
                let id = format!("session-{}", uuid::Uuid::new_v4());
                let state = json!({
                    "sessionId": id,
                    "name": p.name,
                    "data": p.data.unwrap_or(Value::Null),
                });
                self.sessions.write().insert(id.clone(), state);
                Ok(json!({ "sessionId": id }))
            }

            "session/get" => {
                let p: SessionIdParam = parse_params(params)?;
                match self.sessions.read().get(&p.session_id) {
                    Some(state) => Ok(json!({ "session": state })),
                    None => Ok(json!({ "session": null })),
                }
            }

            _ => Err(ECPError::method_not_found(method)),
        }
    }
}

#[derive(Deserialize, Default)]
struct SessionCreateParams {
    name: Option<String>,
    data: Option<Value>,
}

#[derive(Deserialize)]
struct SessionIdParam {
    #[serde(rename = "sessionId")]
    session_id: String,
}

fn parse_params<T: for<'de> Deserialize<'de>>(params: Option<Value>) -> Result<T, ECPError> {
    match params {
        Some(v) => serde_json::from_value(v).map_err(|e| ECPError::invalid_params(format!("Invalid parameters: {e}"))),
        None => Err(ECPError::invalid_params("Parameters required")),
    }
}

fn parse_params_optional<T: for<'de> Deserialize<'de> + Default>(params: Option<Value>) -> T {
    params.and_then(|v| serde_json::from_value(v).ok()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let svc = SessionService::new();
        let created = svc
            .handle("session/create", Some(json!({"name": "agent-run", "data": {"workingSet": ["src"]}})))
            .await
            .unwrap();
        let id = created["sessionId"].as_str().unwrap().to_string();

        let fetched = svc.handle("session/get", Some(json!({"sessionId": id}))).await.unwrap();
        assert_eq!(fetched["session"]["name"], "agent-run");
        assert_eq!(fetched["session"]["data"]["workingSet"][0], "src");
    }

    #[tokio::test]
    async fn get_unknown_session_returns_null() {
        let svc = SessionService::new();
        let fetched = svc.handle("session/get", Some(json!({"sessionId": "nope"}))).await.unwrap();
        assert_eq!(fetched["session"], Value::Null);
    }

    #[tokio::test]
    async fn create_with_no_params_still_succeeds() {
        let svc = SessionService::new();
        let created = svc.handle("session/create", None).await.unwrap();
        assert!(created["sessionId"].as_str().unwrap().starts_with("session-"));
    }
}
