//! Terminal adapter — `terminal/execute`, a minimal non-PTY command runner.
//!
//! Full PTY session management (create/spawn/write/resize/attach-tmux) is
//! the terminal TUI's job and out of scope for this core; this adapter
//! exists only so Working-Set Governance has a terminal-exec surface to
//! gate.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use ecp_protocol::{ECPError, HandlerResult};
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::json;
use tokio::process::Command;

use crate::Service;

const DEFAULT_TIMEOUT_MS: u64 = 30_000;

pub struct TerminalService {
    workspace_root: RwLock<PathBuf>,
}

impl TerminalService {
    pub fn new(workspace_root: PathBuf) -> Self {
        Self {
            workspace_root: RwLock::new(workspace_root),
        }
    }

    pub fn set_workspace_root(&self, root: PathBuf) {
        *self.workspace_root.write() = root;
    }
}

impl Service for TerminalService {
    fn namespace(&self) -> &str {
        "terminal"
    }

    async fn handle(&self, method: &str, params: Option<serde_json::Value>) -> HandlerResult {
        match method {
            "terminal/execute" => {
                let p: TerminalExecuteParams = parse_params(params)?;
                let cwd = p
                    .cwd
                    .unwrap_or_else(|| self.workspace_root.read().to_string_lossy().to_string());
                let timeout_ms = p.timeout.unwrap_or(DEFAULT_TIMEOUT_MS);

                let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".into());
                let child = Command::new(&shell)
                    .args(["-c", &p.command])
                    .current_dir(&cwd)
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped())
                    .output();

                let output = match tokio::time::timeout(Duration::from_millis(timeout_ms), child).await {
                    Ok(result) => result.map_err(|e| ECPError::server_error(format!("Failed to execute: {e}")))?,
                    Err(_) => {
                        return Err(ECPError::server_error(format!(
                            "Command timed out after {timeout_ms}ms"
                        )))
                    }
                };

                Ok(json!({
                    "stdout": String::from_utf8_lossy(&output.stdout),
                    "stderr": String::from_utf8_lossy(&output.stderr),
                    "exitCode": output.status.code(),
                }))
            }

            _ => Err(ECPError::method_not_found(method)),
        }
    }
}

#[derive(Deserialize)]
struct TerminalExecuteParams {
    command: String,
    cwd: Option<String>,
    timeout: Option<u64>,
}

fn parse_params<T: for<'de> Deserialize<'de>>(params: Option<serde_json::Value>) -> Result<T, ECPError> {
    match params {
        Some(v) => serde_json::from_value(v).map_err(|e| ECPError::invalid_params(format!("Invalid parameters: {e}"))),
        None => Err(ECPError::invalid_params("Parameters required")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn executes_a_simple_command() {
        let svc = TerminalService::new(PathBuf::from("/tmp"));
        let result = svc
            .handle(
                "terminal/execute",
                Some(json!({ "command": "echo hello" })),
            )
            .await
            .unwrap();
        assert!(result["stdout"].as_str().unwrap().contains("hello"));
        assert_eq!(result["exitCode"], 0);
    }

    #[tokio::test]
    async fn unknown_method_is_not_found() {
        let svc = TerminalService::new(PathBuf::from("/tmp"));
        let err = svc.handle("terminal/spawn", None).await.unwrap_err();
        assert_eq!(err.error_code(), ecp_protocol::ECPErrorCode::MethodNotFound);
    }

    #[tokio::test]
    async fn missing_params_is_invalid_params() {
        let svc = TerminalService::new(PathBuf::from("/tmp"));
        let err = svc.handle("terminal/execute", None).await.unwrap_err();
        assert_eq!(err.error_code(), ecp_protocol::ECPErrorCode::InvalidParams);
    }
}
