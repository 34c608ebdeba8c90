//! Document adapter — `document/save`.
//!
//! Full in-memory document buffers (cursors, undo/redo, fold state) belong
//! to the editor UI, not this server; the only document-lifecycle
//! operation this core exposes is persisting content to disk.

use std::path::{Path, PathBuf};

use ecp_protocol::{ECPError, HandlerResult};
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::json;

use crate::Service;

pub struct DocumentService {
    workspace_root: RwLock<PathBuf>,
}

impl DocumentService {
    pub fn new(workspace_root: PathBuf) -> Self {
        Self {
            workspace_root: RwLock::new(workspace_root),
        }
    }

    pub fn set_workspace_root(&self, root: PathBuf) {
        *self.workspace_root.write() = root;
    }

    fn resolve_path(&self, raw: &str) -> PathBuf {
        let stripped = raw.strip_prefix("file://").unwrap_or(raw);
        let path = Path::new(stripped);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace_root.read().join(path)
        }
    }
}

impl Service for DocumentService {
    fn namespace(&self) -> &str {
        "document"
    }

    async fn handle(&self, method: &str, params: Option<serde_json::Value>) -> HandlerResult {
        match method {
            "document/save" => {
                let p: DocumentSaveParams = parse_params(params)?;
                let path = self.resolve_path(&p.uri);

                // The param content wins over whatever is currently on disk
                // when both are present — the caller's buffer is presumed to
                // be the source of truth at save time.
                let content = match p.content {
                    Some(c) => c,
                    None => tokio::fs::read_to_string(&path)
                        .await
                        .map_err(|e| ECPError::invalid_params(format!("No content given and file unreadable: {e}")))?,
                };

                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| ECPError::server_error(format!("Failed to create parent directories: {e}")))?;
                }

                tokio::fs::write(&path, &content)
                    .await
                    .map_err(|e| ECPError::server_error(format!("Failed to save {}: {e}", path.display())))?;

                Ok(json!({
                    "uri": p.uri,
                    "bytesWritten": content.len(),
                }))
            }

            _ => Err(ECPError::method_not_found(method)),
        }
    }
}

#[derive(Deserialize)]
struct DocumentSaveParams {
    uri: String,
    content: Option<String>,
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
    use tempfile::tempdir;

    #[tokio::test]
    async fn save_writes_param_content_over_disk_content() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, "stale").unwrap();

        let svc = DocumentService::new(dir.path().to_path_buf());
        let result = svc
            .handle("document/save", Some(json!({ "uri": "a.txt", "content": "fresh" })))
            .await
            .unwrap();

        assert_eq!(result["bytesWritten"], 5);
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "fresh");
    }

    #[tokio::test]
    async fn save_without_content_rewrites_existing_disk_content() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("b.txt");
        std::fs::write(&file, "already here").unwrap();

        let svc = DocumentService::new(dir.path().to_path_buf());
        svc.handle("document/save", Some(json!({ "uri": "b.txt" }))).await.unwrap();

        assert_eq!(std::fs::read_to_string(&file).unwrap(), "already here");
    }

    #[tokio::test]
    async fn save_without_content_or_existing_file_is_invalid_params() {
        let dir = tempdir().unwrap();
        let svc = DocumentService::new(dir.path().to_path_buf());
        let err = svc
            .handle("document/save", Some(json!({ "uri": "missing.txt" })))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), ecp_protocol::ECPErrorCode::InvalidParams);
    }
}
