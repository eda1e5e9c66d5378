//! Issues, fixes and the accumulated report.
//!
//! Everything the pipeline finds or changes ends up here. Only structural
//! errors abort a run; all other issues travel in a [`Report`] next to the
//! best-effort canonical model.

use crate::ids::IdKind;
use crate::model::{ModelSection, ModelStats};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Unprocessable shape; fatal.
    Structural,
    /// Missing or malformed ids and fields; repairable.
    Format,
    /// Uniqueness violations; repairable.
    Duplicate,
    /// Unresolvable connection endpoints.
    Referential,
    /// Cyclic chains; advisory.
    Cycle,
    /// A chunk that produced no usable model.
    Chunk,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::Structural => "structural",
            ErrorCategory::Format => "format",
            ErrorCategory::Duplicate => "duplicate",
            ErrorCategory::Referential => "referential",
            ErrorCategory::Cycle => "cycle",
            ErrorCategory::Chunk => "chunk",
        };
        f.write_str(name)
    }
}

/// Side of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    Out,
    In,
}

impl Endpoint {
    pub fn key(self) -> &'static str {
        match self {
            Endpoint::Out => "connection_out",
            Endpoint::In => "connection_in",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DanglingReason {
    UnknownAction,
    UnknownObject,
    UnparseableReference,
    EmptyEndpoint,
}

impl fmt::Display for DanglingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DanglingReason::UnknownAction => "unknown action",
            DanglingReason::UnknownObject => "unknown object",
            DanglingReason::UnparseableReference => "unparseable reference",
            DanglingReason::EmptyEndpoint => "empty endpoint",
        };
        f.write_str(text)
    }
}

// ============================================================================
// Issues
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IssueKind {
    MissingSection { section: ModelSection },
    SectionNotArray { section: ModelSection, found: &'static str },
    MissingId { entity: IdKind },
    MalformedId { entity: IdKind, value: String },
    DuplicateId { entity: IdKind, value: String },
    DuplicateComposite { value: String },
    EmptyEndpoint { endpoint: Endpoint },
    MissingName { entity: IdKind },
    NoStates,
    DuplicateStateName { name: String },
    EmptySection { section: ModelSection },
    StateToState,
    Dangling {
        endpoint: Endpoint,
        value: String,
        reason: DanglingReason,
    },
    Cycle { nodes: Vec<String> },
    ChunkFailed { chunk_index: usize, error: String },
}

impl IssueKind {
    /// Stable short name; two issues "of the same kind" share a code.
    pub fn code(&self) -> &'static str {
        match self {
            IssueKind::MissingSection { .. } => "missing_section",
            IssueKind::SectionNotArray { .. } => "section_not_array",
            IssueKind::MissingId { .. } => "missing_id",
            IssueKind::MalformedId { .. } => "malformed_id",
            IssueKind::DuplicateId { .. } => "duplicate_id",
            IssueKind::DuplicateComposite { .. } => "duplicate_composite",
            IssueKind::EmptyEndpoint { .. } => "empty_endpoint",
            IssueKind::MissingName { .. } => "missing_name",
            IssueKind::NoStates => "no_states",
            IssueKind::DuplicateStateName { .. } => "duplicate_state_name",
            IssueKind::EmptySection { .. } => "empty_section",
            IssueKind::StateToState => "state_to_state",
            IssueKind::Dangling { .. } => "dangling",
            IssueKind::Cycle { .. } => "cycle",
            IssueKind::ChunkFailed { .. } => "chunk_failed",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            IssueKind::MissingSection { .. }
            | IssueKind::SectionNotArray { .. }
            | IssueKind::EmptySection { .. } => ErrorCategory::Structural,
            IssueKind::MissingId { .. }
            | IssueKind::MalformedId { .. }
            | IssueKind::MissingName { .. }
            | IssueKind::NoStates => ErrorCategory::Format,
            IssueKind::DuplicateId { .. }
            | IssueKind::DuplicateComposite { .. }
            | IssueKind::DuplicateStateName { .. } => ErrorCategory::Duplicate,
            IssueKind::EmptyEndpoint { .. }
            | IssueKind::StateToState
            | IssueKind::Dangling { .. } => ErrorCategory::Referential,
            IssueKind::Cycle { .. } => ErrorCategory::Cycle,
            IssueKind::ChunkFailed { .. } => ErrorCategory::Chunk,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            IssueKind::MissingName { .. }
            | IssueKind::NoStates
            | IssueKind::DuplicateStateName { .. }
            | IssueKind::EmptySection { .. }
            | IssueKind::StateToState
            | IssueKind::Cycle { .. } => Severity::Warning,
            _ => Severity::Error,
        }
    }

    /// Structural errors make the model unprocessable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            IssueKind::MissingSection { .. } | IssueKind::SectionNotArray { .. }
        )
    }

    /// The normalizer has a deterministic rule for this kind.
    pub fn is_repairable(&self) -> bool {
        matches!(
            self,
            IssueKind::MissingId { .. }
                | IssueKind::MalformedId { .. }
                | IssueKind::DuplicateId { .. }
                | IssueKind::DuplicateComposite { .. }
                | IssueKind::MissingName { .. }
                | IssueKind::NoStates
        )
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueKind::MissingSection { section } => write!(f, "missing section {section}"),
            IssueKind::SectionNotArray { section, found } => {
                write!(f, "section {section} must be an array, found {found}")
            }
            IssueKind::MissingId { entity } => write!(f, "missing {entity} id"),
            IssueKind::MalformedId { entity, value } => {
                write!(f, "malformed {entity} id {value:?}")
            }
            IssueKind::DuplicateId { entity, value } => {
                write!(f, "duplicate {entity} id {value}")
            }
            IssueKind::DuplicateComposite { value } => {
                write!(f, "duplicate composite state id {value}")
            }
            IssueKind::EmptyEndpoint { endpoint } => write!(f, "empty {}", endpoint.key()),
            IssueKind::MissingName { entity } => write!(f, "missing {entity} name"),
            IssueKind::NoStates => write!(f, "object has no states"),
            IssueKind::DuplicateStateName { name } => {
                write!(f, "duplicate state name {name:?}")
            }
            IssueKind::EmptySection { section } => write!(f, "section {section} is empty"),
            IssueKind::StateToState => {
                write!(f, "state-to-state connection without an action in between")
            }
            IssueKind::Dangling {
                endpoint,
                value,
                reason,
            } => write!(f, "dangling {} {value:?}: {reason}", endpoint.key()),
            IssueKind::Cycle { nodes } => write!(f, "cycle {}", cycle_path(nodes)),
            IssueKind::ChunkFailed { chunk_index, error } => {
                write!(f, "chunk {chunk_index} failed: {error}")
            }
        }
    }
}

/// `a -> b -> a` rendering of a cycle.
pub fn cycle_path(nodes: &[String]) -> String {
    let mut path = nodes.join(" -> ");
    if let Some(first) = nodes.first() {
        path.push_str(" -> ");
        path.push_str(first);
    }
    path
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    #[serde(flatten)]
    pub kind: IssueKind,
    pub code: &'static str,
    pub category: ErrorCategory,
    pub severity: Severity,
    /// Path into the model, e.g. `model_objects[1].resource_state[0]`.
    pub location: String,
    pub message: String,
}

impl Issue {
    pub fn new(kind: IssueKind, location: impl Into<String>) -> Self {
        Self {
            code: kind.code(),
            category: kind.category(),
            severity: kind.severity(),
            message: kind.to_string(),
            location: location.into(),
            kind,
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.location.is_empty() {
            write!(f, "[{}] {}", self.category, self.message)
        } else {
            write!(f, "[{}] {}: {}", self.category, self.location, self.message)
        }
    }
}

/// Output of one validator run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<Issue>,
    pub warnings: Vec<Issue>,
}

impl ValidationReport {
    pub fn push(&mut self, issue: Issue) {
        match issue.severity {
            Severity::Error => self.errors.push(issue),
            Severity::Warning => self.warnings.push(issue),
        }
    }

    pub fn issues(&self) -> impl Iterator<Item = &Issue> {
        self.errors.iter().chain(self.warnings.iter())
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }

    pub fn fatal(&self) -> Vec<Issue> {
        self.errors
            .iter()
            .filter(|i| i.kind.is_fatal())
            .cloned()
            .collect()
    }

    pub fn has_repairable(&self) -> bool {
        self.issues().any(|i| i.kind.is_repairable())
    }

    pub fn repairable(&self) -> Vec<Issue> {
        self.issues()
            .filter(|i| i.kind.is_repairable())
            .cloned()
            .collect()
    }

    /// Codes of every error-severity issue.
    pub fn error_codes(&self) -> BTreeSet<&'static str> {
        self.errors.iter().map(|i| i.code).collect()
    }
}

// ============================================================================
// Fixes
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FixKind {
    SynthesizedId { entity: IdKind, id: String },
    RecoveredId { entity: IdKind, from: String, to: String },
    RenamedDuplicate { entity: IdKind, from: String, to: String },
    InsertedNullState { object: String },
    DefaultedName { entity: IdKind, name: String },
    SynthesizedState { composite: String },
    RewroteEndpoint {
        endpoint: Endpoint,
        from: String,
        to: String,
    },
}

impl fmt::Display for FixKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FixKind::SynthesizedId { entity, id } => write!(f, "assigned {entity} id {id}"),
            FixKind::RecoveredId { entity, from, to } => {
                write!(f, "recovered {entity} id {from:?} as {to}")
            }
            FixKind::RenamedDuplicate { entity, from, to } => {
                write!(f, "renamed duplicate {entity} id {from} to {to}")
            }
            FixKind::InsertedNullState { object } => {
                write!(f, "inserted null state into {object}")
            }
            FixKind::DefaultedName { entity, name } => {
                write!(f, "named {entity} {name:?}")
            }
            FixKind::SynthesizedState { composite } => {
                write!(f, "synthesized state {composite}")
            }
            FixKind::RewroteEndpoint { endpoint, from, to } => {
                write!(f, "rewrote {} {from:?} to {to}", endpoint.key())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fix {
    #[serde(flatten)]
    pub kind: FixKind,
    pub location: String,
}

impl Fix {
    pub fn new(kind: FixKind, location: impl Into<String>) -> Self {
        Self {
            kind,
            location: location.into(),
        }
    }
}

impl fmt::Display for Fix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.kind)
    }
}

// ============================================================================
// Report
// ============================================================================

/// Everything a pipeline run found and changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Report {
    pub errors: Vec<Issue>,
    pub warnings: Vec<Issue>,
    pub fixes: Vec<Fix>,
    pub cycles: Vec<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<ModelStats>,
}

impl Report {
    pub fn push(&mut self, issue: Issue) {
        match issue.severity {
            Severity::Error => self.errors.push(issue),
            Severity::Warning => self.warnings.push(issue),
        }
    }

    pub fn absorb(&mut self, findings: ValidationReport) {
        self.errors.extend(findings.errors);
        self.warnings.extend(findings.warnings);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }

    pub fn count(&self, category: ErrorCategory) -> usize {
        self.errors
            .iter()
            .chain(self.warnings.iter())
            .filter(|i| i.category == category)
            .count()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} errors, {} warnings, {} fixes",
            self.errors.len(),
            self.warnings.len(),
            self.fixes.len()
        )
    }

    /// Plain-text rendering for logs and files.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("=== Model report ===\n");
        if let Some(stats) = &self.stats {
            out.push_str(&format!("Model: {stats}\n"));
        }
        if self.is_clean() && self.fixes.is_empty() {
            out.push_str("No issues found.\n");
            return out;
        }
        if !self.errors.is_empty() {
            out.push_str(&format!("\nErrors ({}):\n", self.errors.len()));
            for issue in &self.errors {
                out.push_str(&format!("  x {issue}\n"));
            }
        }
        if !self.warnings.is_empty() {
            out.push_str(&format!("\nWarnings ({}):\n", self.warnings.len()));
            for issue in &self.warnings {
                out.push_str(&format!("  ! {issue}\n"));
            }
        }
        if !self.fixes.is_empty() {
            out.push_str(&format!("\nFixes applied ({}):\n", self.fixes.len()));
            for fix in &self.fixes {
                out.push_str(&format!("  + {fix}\n"));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_carries_category_and_severity() {
        let issue = Issue::new(
            IssueKind::MalformedId {
                entity: IdKind::Action,
                value: "a7".into(),
            },
            "model_actions[0]",
        );
        assert_eq!(issue.category, ErrorCategory::Format);
        assert_eq!(issue.severity, Severity::Error);
        assert_eq!(issue.code, "malformed_id");
        assert_eq!(
            issue.to_string(),
            "[format] model_actions[0]: malformed action id \"a7\""
        );
        assert!(issue.kind.is_repairable());
    }

    #[test]
    fn validation_report_routes_by_severity() {
        let mut report = ValidationReport::default();
        report.push(Issue::new(IssueKind::NoStates, "model_objects[0]"));
        report.push(Issue::new(
            IssueKind::MissingSection {
                section: ModelSection::Actions,
            },
            "",
        ));
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.fatal().len(), 1);
        assert!(report.has_repairable());
        assert_eq!(
            report.error_codes().into_iter().collect::<Vec<_>>(),
            vec!["missing_section"]
        );
    }

    #[test]
    fn issue_serializes_flat() {
        let issue = Issue::new(
            IssueKind::DuplicateId {
                entity: IdKind::Object,
                value: "o00001".into(),
            },
            "model_objects[2]",
        );
        let value = serde_json::to_value(&issue).unwrap();
        assert_eq!(value["kind"], "duplicate_id");
        assert_eq!(value["entity"], "object");
        assert_eq!(value["category"], "duplicate");
        assert_eq!(value["severity"], "error");
    }

    #[test]
    fn render_lists_sections() {
        let mut report = Report::default();
        report.push(Issue::new(
            IssueKind::Cycle {
                nodes: vec!["a00001".into(), "o00001s00001".into()],
            },
            "",
        ));
        report.fixes.push(Fix::new(
            FixKind::SynthesizedState {
                composite: "o00002s00003".into(),
            },
            "model_connections[0]",
        ));
        let text = report.render();
        assert!(text.contains("Warnings (1)"));
        assert!(text.contains("a00001 -> o00001s00001 -> a00001"));
        assert!(text.contains("synthesized state o00002s00003"));
        assert!(!text.contains("Errors"));
    }
}
