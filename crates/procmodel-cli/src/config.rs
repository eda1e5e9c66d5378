//! `--config` file handling.
//!
//! Values come from the environment first, then the config file, then the
//! command line; each layer only overrides the keys it sets.

use anyhow::{Context, Result};
use procmodel_core::PipelineConfig;
use procmodel_extract::{ExtractionConfig, HttpGeneratorConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub pipeline: PipelineConfig,
    pub extraction: ExtractionConfig,
    pub generator: HttpGeneratorConfig,
}

impl CliConfig {
    pub fn from_env() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            extraction: ExtractionConfig::from_env(),
            generator: HttpGeneratorConfig::from_env(),
        }
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        let base = Self::from_env();
        let Some(path) = path else {
            return Ok(base);
        };
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let overlay: Value = serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        base.overlay(overlay)
            .with_context(|| format!("invalid config {}", path.display()))
    }

    fn overlay(self, overlay: Value) -> Result<Self> {
        let mut value = serde_json::to_value(self)?;
        merge_json(&mut value, overlay);
        Ok(serde_json::from_value(value)?)
    }
}

fn merge_json(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                merge_json(base.entry(key).or_insert(Value::Null), value);
            }
        }
        (base, overlay) => *base = overlay,
    }
}
