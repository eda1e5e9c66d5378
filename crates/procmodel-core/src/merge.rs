//! Partial Model Merger
//!
//! Folds per-chunk results into one aggregate raw model. The aggregate is
//! not canonical: id collisions between chunks are resolved afterwards by
//! the normalizer, which uses the `origin` tag set here to scope renames.

use crate::raw::{RawModel, Section};
use crate::report::{Issue, IssueKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of one generator call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialResult {
    pub chunk_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<RawModel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Raw generator output, kept for export when the chunk failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl PartialResult {
    pub fn succeeded(chunk_index: usize, model: RawModel) -> Self {
        Self {
            chunk_index,
            model: Some(model),
            error: None,
            payload: None,
        }
    }

    pub fn failed(chunk_index: usize, error: impl Into<String>, payload: Option<Value>) -> Self {
        Self {
            chunk_index,
            model: None,
            error: Some(error.into()),
            payload,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some() || self.model.is_none()
    }

    pub fn issue(&self) -> Issue {
        Issue::new(
            IssueKind::ChunkFailed {
                chunk_index: self.chunk_index,
                error: self.error.clone().unwrap_or_default(),
            },
            format!("chunk[{}]", self.chunk_index),
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct MergeOutcome {
    pub model: RawModel,
    pub failed: Vec<PartialResult>,
}

/// Concatenate sections in chunk-index order. Failed, empty and
/// structurally broken results go to `failed` instead of aborting.
pub fn merge(mut results: Vec<PartialResult>) -> MergeOutcome {
    results.sort_by_key(|r| r.chunk_index);

    let mut actions = Vec::new();
    let mut objects = Vec::new();
    let mut connections = Vec::new();
    let mut failed = Vec::new();

    for result in results {
        if result.error.is_some() {
            failed.push(result);
            continue;
        }
        let Some(model) = result.model else {
            failed.push(PartialResult::failed(
                result.chunk_index,
                "chunk produced neither a model nor an error",
                result.payload,
            ));
            continue;
        };

        let broken = model.broken_sections();
        if !broken.is_empty() {
            let names: Vec<&str> = broken.iter().map(|s| s.key()).collect();
            let payload = result.payload.unwrap_or_else(|| model.to_value());
            failed.push(PartialResult::failed(
                result.chunk_index,
                format!("model is missing array sections: {}", names.join(", ")),
                Some(payload),
            ));
            continue;
        }

        let tagged = model.with_origin(result.chunk_index);
        if let Section::Items(items) = tagged.actions {
            actions.extend(items);
        }
        if let Section::Items(items) = tagged.objects {
            objects.extend(items);
        }
        if let Section::Items(items) = tagged.connections {
            connections.extend(items);
        }
    }

    if !failed.is_empty() {
        tracing::warn!(failed = failed.len(), "chunks excluded from merge");
    }

    MergeOutcome {
        model: RawModel {
            actions: Section::Items(actions),
            objects: Section::Items(objects),
            connections: Section::Items(connections),
        },
        failed,
    }
}
