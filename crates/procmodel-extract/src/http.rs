//! HTTP generator client
//!
//! Posts `{ "text", "model_name" }` to a JSON endpoint and reads the reply
//! with [`interpret_response`].

use crate::generator::{interpret_response, GeneratedModel, GeneratorError, ModelGenerator};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:5009/api/generate-model";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpGeneratorConfig {
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl Default for HttpGeneratorConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout_secs: 120,
        }
    }
}

impl HttpGeneratorConfig {
    /// Defaults overridden by `PROCMODEL_GENERATOR_URL` and
    /// `PROCMODEL_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("PROCMODEL_GENERATOR_URL") {
            config.endpoint = url;
        }
        if let Some(secs) = std::env::var("PROCMODEL_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.timeout_secs = secs;
        }
        config
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    text: &'a str,
    model_name: &'a str,
}

pub struct HttpGenerator {
    client: reqwest::Client,
    config: HttpGeneratorConfig,
}

impl HttpGenerator {
    pub fn new(config: HttpGeneratorConfig) -> Result<Self, GeneratorError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GeneratorError::Network(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &HttpGeneratorConfig {
        &self.config
    }
}

#[async_trait]
impl ModelGenerator for HttpGenerator {
    async fn generate(
        &self,
        text: &str,
        model_name: &str,
    ) -> Result<GeneratedModel, GeneratorError> {
        let response = self
            .client
            .post(&self.config.endpoint)
            .json(&GenerateRequest { text, model_name })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GeneratorError::Timeout(Duration::from_secs(self.config.timeout_secs))
                } else {
                    GeneratorError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GeneratorError::Network(e.to_string()))?;
        if !status.is_success() {
            return Err(GeneratorError::Status {
                status: status.as_u16(),
                body,
            });
        }
        tracing::debug!(bytes = body.len(), "generator responded");
        interpret_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_fill_missing_fields() {
        let config: HttpGeneratorConfig =
            serde_json::from_str(r#"{"endpoint": "http://gen.local/api"}"#).unwrap();
        assert_eq!(config.endpoint, "http://gen.local/api");
        assert_eq!(config.timeout_secs, 120);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_network_error() {
        let generator = HttpGenerator::new(HttpGeneratorConfig {
            endpoint: "http://127.0.0.1:1/generate".to_string(),
            timeout_secs: 5,
        })
        .unwrap();
        let err = generator.generate("text", "default").await.unwrap_err();
        assert!(matches!(
            err,
            GeneratorError::Network(_) | GeneratorError::Timeout(_)
        ));
        assert!(err.payload().is_none());
    }
}
