//! Failed-chunk export artifact
//!
//! ```json
//! { "run_id": "...", "exported_at": "...",
//!   "failed_chunks": [{ "chunk_index": 2, "error": "...", "payload": ..., "text": "..." }] }
//! ```

use chrono::{DateTime, Utc};
use procmodel_core::{Chunk, PartialResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed export: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedChunk {
    pub chunk_index: usize,
    pub error: String,
    #[serde(default)]
    pub payload: Option<Value>,
    /// Source text of the chunk, so it can be resubmitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedChunkExport {
    pub run_id: Uuid,
    pub exported_at: DateTime<Utc>,
    pub failed_chunks: Vec<FailedChunk>,
}

impl FailedChunkExport {
    pub fn new(run_id: Uuid, failed: &[PartialResult], chunks: &[Chunk]) -> Self {
        let failed_chunks = failed
            .iter()
            .map(|result| FailedChunk {
                chunk_index: result.chunk_index,
                error: result.error.clone().unwrap_or_default(),
                payload: result.payload.clone(),
                text: chunks
                    .iter()
                    .find(|c| c.index == result.chunk_index)
                    .map(|c| c.text.clone()),
            })
            .collect();
        Self {
            run_id,
            exported_at: Utc::now(),
            failed_chunks,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.failed_chunks.is_empty()
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ExportError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| ExportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(
            path = %path.display(),
            failed = self.failed_chunks.len(),
            "failed chunks exported"
        );
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ExportError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ExportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&text)?)
    }
}
