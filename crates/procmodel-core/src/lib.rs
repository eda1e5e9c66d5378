//! # procmodel-core
//!
//! Canonicalization and integrity engine for process models: actions,
//! objects with states, and the connections between them.
//!
//! Contributions arrive from several sources (a chunk-by-chunk text-to-model
//! generator, a graph editor, JSON files) and each invents its own ids,
//! drops fields or references nodes that do not exist. This crate turns any
//! number of such contributions into one model with:
//!
//! - globally unique, correctly formatted ids (`a00001`, `o00001`, `s00001`)
//! - fully resolved connection endpoints
//! - reported anomalies (duplicates, dangling edges, cycles)
//! - a lossless mapping to and from a node/edge graph
//!
//! ## Pipeline
//!
//! ```text
//! text ─► chunking ─► generator (external) ─► merge ─► validate
//!                                                        │
//!           Model ◄─ cycles ◄─ resolve ◄─ normalize ◄────┘
//! ```
//!
//! All stages are pure and synchronous. See [`pipeline::Pipeline`].

pub mod chunking;
pub mod cycles;
pub mod document;
pub mod graph;
pub mod ids;
pub mod merge;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod raw;
pub mod report;
pub mod resolve;
pub mod validation;

pub use chunking::{split, split_chunks, Chunk};
pub use cycles::find_cycles;
pub use document::{LegacyModel, ModelDocument, ParseError};
pub use graph::{to_graph, to_model, Graph, GraphEdge, GraphNode};
pub use ids::{ActionId, IdAllocator, IdError, IdKind, NodeRef, ObjectId, StateId};
pub use merge::{merge, MergeOutcome, PartialResult};
pub use model::{Action, Connection, Links, Model, Object, State};
pub use normalize::{normalize, NormalizeOutcome, Rename};
pub use pipeline::{canonicalize, CanonicalOutcome, Pipeline, PipelineConfig, PipelineError};
pub use raw::{RawModel, Section};
pub use report::{ErrorCategory, Fix, Issue, IssueKind, Report, Severity, ValidationReport};
pub use resolve::{resolve, resolve_with_renames, DanglingConnection, ResolveOutcome};
pub use validation::validate;
