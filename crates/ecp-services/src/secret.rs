//! Secret adapter — `secret/get`, `secret/set`, `secret/has` over a
//! priority-ordered provider chain.
//!
//! Durable, encrypted-at-rest secret storage is out of scope for this
//! core; the in-memory provider here exists so the adapter contract has a
//! writable backend to exercise.

use std::collections::HashMap;

use ecp_protocol::{ECPError, HandlerResult};
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::Service;

/// A secret provider that can read/write credentials.
trait SecretProvider: Send + Sync {
    fn id(&self) -> &str;
    fn is_writable(&self) -> bool;
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), String>;
}

/// Environment variable provider (read-only).
struct EnvProvider;

impl SecretProvider for EnvProvider {
    fn id(&self) -> &str {
        "env"
    }
    fn is_writable(&self) -> bool {
        false
    }
    fn get(&self, key: &str) -> Option<String> {
        let env_key = match key {
            "anthropic-api-key" => "ANTHROPIC_API_KEY",
            "openai-api-key" => "OPENAI_API_KEY",
            "gemini-api-key" => "GEMINI_API_KEY",
            _ => {
                let upper = key.replace('-', "_").to_uppercase();
                return std::env::var(&upper).ok();
            }
        };
        std::env::var(env_key).ok()
    }
    fn set(&self, _key: &str, _value: &str) -> Result<(), String> {
        Err("Environment provider is read-only".into())
    }
}

/// In-process provider — lives only for the server's lifetime.
struct MemoryProvider {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryProvider {
    fn new() -> Self {
        Self {
            values: RwLock::new(HashMap::new()),
        }
    }
}

impl SecretProvider for MemoryProvider {
    fn id(&self) -> &str {
        "memory"
    }
    fn is_writable(&self) -> bool {
        true
    }
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }
    fn set(&self, key: &str, value: &str) -> Result<(), String> {
        self.values.write().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Secret adapter — checks providers in registration order, returning the
/// first match for reads and writing to the first writable provider.
pub struct SecretService {
    providers: Vec<Box<dyn SecretProvider>>,
}

impl SecretService {
    pub fn new() -> Self {
        Self {
            providers: vec![Box::new(EnvProvider), Box::new(MemoryProvider::new())],
        }
    }
}

impl Default for SecretService {
    fn default() -> Self {
        Self::new()
    }
}

impl Service for SecretService {
    fn namespace(&self) -> &str {
        "secret"
    }

    async fn handle(&self, method: &str, params: Option<Value>) -> HandlerResult {
        match method {
            "secret/get" => {
                let p: SecretKeyParam = parse_params(params)?;
                for provider in &self.providers {
                    if let Some(value) = provider.get(&p.key) {
                        return Ok(json!({
                            "key": p.key,
                            "value": value,
                            "provider": provider.id(),
                        }));
                    }
                }
                Ok(json!({ "key": p.key, "value": null }))
            }

            "secret/set" => {
                let p: SecretSetParam = parse_params(params)?;
                for provider in &self.providers {
                    if provider.is_writable() {
                        provider.set(&p.key, &p.value).map_err(ECPError::server_error)?;
                        return Ok(json!({ "success": true, "provider": provider.id() }));
                    }
                }
                Err(ECPError::server_error("No writable secret provider available"))
            }

            "secret/has" => {
                let p: SecretKeyParam = parse_params(params)?;
                let has = self.providers.iter().any(|prov| prov.get(&p.key).is_some());
                Ok(json!({ "has": has }))
            }

            _ => Err(ECPError::method_not_found(method)),
        }
    }
}

#[derive(Deserialize)]
struct SecretKeyParam {
    key: String,
}

#[derive(Deserialize)]
struct SecretSetParam {
    key: String,
    value: String,
}

fn parse_params<T: for<'de> Deserialize<'de>>(params: Option<Value>) -> Result<T, ECPError> {
    match params {
        Some(v) => serde_json::from_value(v).map_err(|e| ECPError::invalid_params(format!("Invalid parameters: {e}"))),
        None => Err(ECPError::invalid_params("Parameters required")),
    }
}
