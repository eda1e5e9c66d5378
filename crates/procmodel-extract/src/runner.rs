//! Chunk-batch extraction driver
//!
//! Splits text, calls the generator once per non-blank chunk under a
//! per-call timeout, and hands the ordered results to the pipeline. A chunk
//! that fails never stops the others.

use crate::export::FailedChunkExport;
use crate::generator::{GeneratorError, ModelGenerator};
use chrono::{DateTime, Utc};
use procmodel_core::chunking::DEFAULT_MAX_CHUNK_CHARS;
use procmodel_core::{split_chunks, CanonicalOutcome, Chunk, PartialResult, Pipeline, PipelineError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

pub const DEFAULT_MODEL_NAME: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Passed through to the generator untouched.
    pub model_name: String,
    pub max_chunk_chars: usize,
    /// Per generator call.
    pub timeout_secs: u64,
    /// Generator calls in flight; 1 runs chunks sequentially.
    pub concurrency: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            model_name: DEFAULT_MODEL_NAME.to_string(),
            max_chunk_chars: DEFAULT_MAX_CHUNK_CHARS,
            timeout_secs: 120,
            concurrency: 1,
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl ExtractionConfig {
    /// Defaults overridden by `PROCMODEL_MODEL_NAME`, `PROCMODEL_TIMEOUT_SECS`
    /// and `PROCMODEL_CONCURRENCY`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(name) = std::env::var("PROCMODEL_MODEL_NAME") {
            config.model_name = name;
        }
        if let Some(secs) = env_parse("PROCMODEL_TIMEOUT_SECS") {
            config.timeout_secs = secs;
        }
        if let Some(concurrency) = env_parse("PROCMODEL_CONCURRENCY") {
            config.concurrency = concurrency;
        }
        config
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Generator results for one text, ordered by chunk index.
#[derive(Debug, Clone)]
pub struct ExtractionRun {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub chunks: Vec<Chunk>,
    pub results: Vec<PartialResult>,
}

impl ExtractionRun {
    pub fn failed(&self) -> impl Iterator<Item = &PartialResult> {
        self.results.iter().filter(|r| r.is_failure())
    }

    pub fn chunk_text(&self, index: usize) -> Option<&str> {
        self.chunks
            .iter()
            .find(|c| c.index == index)
            .map(|c| c.text.as_str())
    }
}

/// A finished run and the canonical model built from it.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub run: ExtractionRun,
    pub outcome: CanonicalOutcome,
}

impl Extraction {
    /// Every chunk excluded from the merge, with its source text.
    pub fn failed_export(&self) -> FailedChunkExport {
        FailedChunkExport::new(self.run.run_id, &self.outcome.failed, &self.run.chunks)
    }
}

/// Canonicalization failed after the generator ran. The run is kept so its
/// payloads can still be exported.
#[derive(Debug, thiserror::Error)]
#[error("canonicalizing extraction run {}", .run.run_id)]
pub struct ExtractionError {
    pub run: ExtractionRun,
    #[source]
    pub error: PipelineError,
}

impl ExtractionError {
    /// Every chunk of the run. Chunks the generator answered carry the
    /// pipeline error alongside their payload.
    pub fn export(&self) -> FailedChunkExport {
        let results: Vec<PartialResult> = self
            .run
            .results
            .iter()
            .map(|result| {
                let mut result = result.clone();
                if result.error.is_none() {
                    result.error = Some(format!("model not canonicalized: {}", self.error));
                    if result.payload.is_none() {
                        result.payload = result.model.as_ref().map(|m| m.to_value());
                    }
                }
                result
            })
            .collect();
        FailedChunkExport::new(self.run.run_id, &results, &self.run.chunks)
    }
}

pub struct ExtractionRunner {
    generator: Arc<dyn ModelGenerator>,
    config: ExtractionConfig,
}

impl ExtractionRunner {
    pub fn new(generator: Arc<dyn ModelGenerator>, config: ExtractionConfig) -> Self {
        Self { generator, config }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Run the generator over every chunk of `text`.
    pub async fn run(&self, text: &str) -> ExtractionRun {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let chunks = split_chunks(text, self.config.max_chunk_chars);
        let work: Vec<Chunk> = chunks
            .iter()
            .filter(|c| !c.text.is_empty())
            .cloned()
            .collect();

        tracing::info!(%run_id, chunks = work.len(), "extraction started");

        let mut results = if self.config.concurrency <= 1 {
            self.run_sequential(&work).await
        } else {
            self.run_concurrent(&work).await
        };
        results.sort_by_key(|r| r.chunk_index);

        let failed = results.iter().filter(|r| r.is_failure()).count();
        tracing::info!(%run_id, chunks = results.len(), failed, "extraction finished");

        ExtractionRun {
            run_id,
            started_at,
            finished_at: Utc::now(),
            chunks,
            results,
        }
    }

    /// [`run`](Self::run), then canonicalize the collected results.
    pub async fn extract(
        &self,
        text: &str,
        pipeline: &Pipeline,
    ) -> Result<Extraction, ExtractionError> {
        let run = self.run(text).await;
        match pipeline.canonicalize_partials(run.results.clone()) {
            Ok(outcome) => Ok(Extraction { run, outcome }),
            Err(error) => {
                tracing::warn!(run_id = %run.run_id, %error, "extracted model not canonicalized");
                Err(ExtractionError { run, error })
            }
        }
    }

    async fn run_sequential(&self, work: &[Chunk]) -> Vec<PartialResult> {
        let mut results = Vec::with_capacity(work.len());
        for chunk in work {
            results.push(
                run_chunk(
                    self.generator.as_ref(),
                    chunk,
                    &self.config.model_name,
                    self.config.timeout(),
                )
                .await,
            );
        }
        results
    }

    async fn run_concurrent(&self, work: &[Chunk]) -> Vec<PartialResult> {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut set = JoinSet::new();

        for chunk in work.iter().cloned() {
            let generator = Arc::clone(&self.generator);
            let semaphore = Arc::clone(&semaphore);
            let model_name = self.config.model_name.clone();
            let limit = self.config.timeout();
            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                run_chunk(generator.as_ref(), &chunk, &model_name, limit).await
            });
        }

        let mut results = Vec::with_capacity(work.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => tracing::warn!(error = %e, "chunk task aborted"),
            }
        }

        // A panicked task loses its index; record those chunks as failed.
        let seen: BTreeSet<usize> = results.iter().map(|r| r.chunk_index).collect();
        for chunk in work.iter().filter(|c| !seen.contains(&c.index)) {
            results.push(PartialResult::failed(chunk.index, "chunk task aborted", None));
        }
        results
    }
}

async fn run_chunk(
    generator: &dyn ModelGenerator,
    chunk: &Chunk,
    model_name: &str,
    limit: Duration,
) -> PartialResult {
    match tokio::time::timeout(limit, generator.generate(&chunk.text, model_name)).await {
        Ok(Ok(generated)) => {
            tracing::debug!(chunk = chunk.index, "chunk generated");
            PartialResult {
                chunk_index: chunk.index,
                model: Some(generated.model),
                error: None,
                payload: Some(generated.payload),
            }
        }
        Ok(Err(err)) => {
            tracing::warn!(chunk = chunk.index, error = %err, "chunk failed");
            PartialResult::failed(chunk.index, err.to_string(), err.payload())
        }
        Err(_) => {
            let err = GeneratorError::Timeout(limit);
            tracing::warn!(chunk = chunk.index, error = %err, "chunk failed");
            PartialResult::failed(chunk.index, err.to_string(), None)
        }
    }
}
