//! Canonicalization pipeline
//!
//! ```text
//!   RawModel ─► validate ─► (normalize ─► validate)* ─► resolve ─► cycles ─► Model
//!                  │                │                      │          │
//!                  ▼                ▼                      ▼          ▼
//!             fatal shape      fixes/renames           dangling    warnings
//! ```
//!
//! Only an unprocessable shape, a repair that introduces a new kind of
//! error, or a repair that does not converge stops the run. Everything
//! else is collected in the [`Report`].

use crate::cycles::find_cycles;
use crate::document::{ModelDocument, ParseError};
use crate::ids::IdError;
use crate::merge::{merge, PartialResult};
use crate::model::{Model, ModelConversionError};
use crate::normalize::{normalize, Rename};
use crate::raw::RawModel;
use crate::report::{Issue, IssueKind, Report};
use crate::resolve::{resolve_with_renames, DanglingConnection};
use crate::validation::validate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Upper bound on normalize/re-validate rounds.
    pub max_normalize_passes: usize,
    pub report_cycles: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_normalize_passes: 3,
            report_cycles: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("model is structurally unprocessable: {}", summarize(.issues))]
    Structural { issues: Vec<Issue>, payload: Value },
    #[error("repair introduced new issue kinds: {}", .kinds.join(", "))]
    RepairIntroducedIssue {
        kinds: Vec<&'static str>,
        issues: Vec<Issue>,
    },
    #[error("normalization did not converge after {passes} passes: {}", summarize(.remaining))]
    NonIdempotentFix { passes: usize, remaining: Vec<Issue> },
    #[error("id space: {0}")]
    IdSpace(#[from] IdError),
    #[error("document: {0}")]
    Parse(#[from] ParseError),
    #[error("canonical conversion failed: {0}")]
    Conversion(#[from] ModelConversionError),
}

fn summarize(issues: &[Issue]) -> String {
    issues
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl PipelineError {
    /// Original input attached to a structural failure.
    pub fn payload(&self) -> Option<&Value> {
        match self {
            PipelineError::Structural { payload, .. } => Some(payload),
            _ => None,
        }
    }
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct CanonicalOutcome {
    pub model: Model,
    pub report: Report,
    /// Connections dropped for unresolvable endpoints; export only.
    pub dangling: Vec<DanglingConnection>,
    /// Chunks excluded before the merge.
    pub failed: Vec<PartialResult>,
    pub renames: Vec<Rename>,
}

#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn canonicalize_document(
        &self,
        document: ModelDocument,
    ) -> Result<CanonicalOutcome, PipelineError> {
        self.canonicalize(document.into_raw()?)
    }

    /// Merge chunk results, then canonicalize the aggregate. Failed chunks
    /// are reported and returned alongside the model.
    pub fn canonicalize_partials(
        &self,
        results: Vec<PartialResult>,
    ) -> Result<CanonicalOutcome, PipelineError> {
        let merged = merge(results);
        let mut outcome = self.canonicalize(merged.model)?;
        for failed in &merged.failed {
            outcome.report.push(failed.issue());
        }
        outcome.failed = merged.failed;
        Ok(outcome)
    }

    pub fn canonicalize(&self, raw: RawModel) -> Result<CanonicalOutcome, PipelineError> {
        let initial = validate(&raw);
        let fatal = initial.fatal();
        if !fatal.is_empty() {
            tracing::warn!(issues = fatal.len(), "structural errors, aborting");
            return Err(PipelineError::Structural {
                issues: fatal,
                payload: raw.to_value(),
            });
        }

        let mut known_codes: BTreeSet<&'static str> = initial.error_codes();
        let mut current = initial.clone();
        let mut model = raw;
        let mut fixes = Vec::new();
        let mut renames = Vec::new();
        let mut passes = 0;

        while current.has_repairable() && passes < self.config.max_normalize_passes {
            passes += 1;
            let outcome = normalize(&model, &current)?;
            fixes.extend(outcome.applied);
            renames.extend(outcome.renames);
            model = outcome.model;

            let next = validate(&model);
            let introduced: Vec<&'static str> = next
                .error_codes()
                .difference(&known_codes)
                .copied()
                .collect();
            if !introduced.is_empty() {
                return Err(PipelineError::RepairIntroducedIssue {
                    kinds: introduced,
                    issues: next.errors,
                });
            }
            known_codes.extend(next.error_codes());
            current = next;
        }

        if current.has_repairable() {
            return Err(PipelineError::NonIdempotentFix {
                passes,
                remaining: current.repairable(),
            });
        }

        let resolved = resolve_with_renames(&model, &renames);
        fixes.extend(resolved.applied);
        let model = Model::try_from(&resolved.model)?;

        let mut report = Report::default();
        report.absorb(initial);
        for dangling in &resolved.dangling {
            for issue in dangling.issues() {
                // Empty endpoints were already reported by the validator.
                let duplicate = report.errors.iter().any(|e| {
                    matches!(e.kind, IssueKind::EmptyEndpoint { .. })
                        && e.location == issue.location
                });
                if !duplicate {
                    report.push(issue);
                }
            }
        }

        if self.config.report_cycles {
            for cycle in find_cycles(&model) {
                let nodes: Vec<String> = cycle.iter().map(|n| n.to_string()).collect();
                report.push(Issue::new(IssueKind::Cycle { nodes: nodes.clone() }, ""));
                report.cycles.push(nodes);
            }
        }
        report.fixes = fixes;
        report.stats = Some(model.stats());

        tracing::info!(
            passes,
            fixes = report.fixes.len(),
            dangling = resolved.dangling.len(),
            self_loops = model.connections.iter().filter(|c| c.is_self_loop()).count(),
            cycles = report.cycles.len(),
            "model canonicalized"
        );

        Ok(CanonicalOutcome {
            model,
            report,
            dangling: resolved.dangling,
            failed: Vec::new(),
            renames,
        })
    }
}

/// [`Pipeline::canonicalize`] with default configuration.
pub fn canonicalize(raw: RawModel) -> Result<CanonicalOutcome, PipelineError> {
    Pipeline::default().canonicalize(raw)
}
