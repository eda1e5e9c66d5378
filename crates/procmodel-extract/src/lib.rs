//! # procmodel-extract
//!
//! Drives an external text-to-model generator over a long text: split into
//! chunks, call the generator per chunk with a timeout, merge what came
//! back, and export what did not.
//!
//! The HTTP client lives behind the default `http` feature; anything that
//! implements [`ModelGenerator`] can be plugged into [`ExtractionRunner`].

pub mod export;
pub mod generator;
#[cfg(feature = "http")]
pub mod http;
pub mod runner;

pub use export::{ExportError, FailedChunk, FailedChunkExport};
pub use generator::{interpret_response, GeneratedModel, GeneratorError, ModelGenerator};
#[cfg(feature = "http")]
pub use http::{HttpGenerator, HttpGeneratorConfig};
pub use runner::{
    Extraction, ExtractionConfig, ExtractionError, ExtractionRun, ExtractionRunner,
};
