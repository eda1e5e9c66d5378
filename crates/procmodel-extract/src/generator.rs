//! Text-to-model generator interface
//!
//! A generator turns one chunk of text into a raw model. Implementations
//! only move bytes; [`interpret_response`] owns the reading of whatever the
//! remote side sent back.

use async_trait::async_trait;
use procmodel_core::model::ModelSection;
use procmodel_core::{ModelDocument, RawModel};
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    #[error("generator timed out after {0:?}")]
    Timeout(Duration),
    #[error("generator unreachable: {0}")]
    Network(String),
    #[error("generator returned HTTP {status}")]
    Status { status: u16, body: String },
    #[error("generator response is not a model: {reason}")]
    InvalidResponse { reason: String, body: String },
    #[error("generator reported failure: {message}")]
    Rejected {
        message: String,
        payload: Option<Value>,
    },
}

impl GeneratorError {
    /// Whatever the generator sent back, for the failed-chunk export.
    pub fn payload(&self) -> Option<Value> {
        match self {
            GeneratorError::Status { body, .. } | GeneratorError::InvalidResponse { body, .. } => {
                if body.is_empty() {
                    None
                } else {
                    Some(Value::String(body.clone()))
                }
            }
            GeneratorError::Rejected { payload, .. } => payload.clone(),
            GeneratorError::Timeout(_) | GeneratorError::Network(_) => None,
        }
    }
}

/// A model produced for one chunk, with the JSON it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedModel {
    pub model: RawModel,
    pub payload: Value,
}

#[async_trait]
pub trait ModelGenerator: Send + Sync {
    async fn generate(&self, text: &str, model_name: &str)
        -> Result<GeneratedModel, GeneratorError>;
}

/// Read a generator response body.
///
/// Accepted shapes, in order:
/// - `{"success": true, "model": {...}}`
/// - `{"success": false, "error": "..."}` (or the error nested in `model`)
/// - a bare canonical or legacy model
///
/// A body that is not JSON is searched for the span between its first `{`
/// and last `}`.
pub fn interpret_response(body: &str) -> Result<GeneratedModel, GeneratorError> {
    let value = parse_lenient(body).ok_or_else(|| GeneratorError::InvalidResponse {
        reason: "no JSON object in response".to_string(),
        body: body.to_string(),
    })?;
    interpret_value(value, body)
}

fn parse_lenient(text: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return Some(value);
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

fn invalid(reason: impl Into<String>, body: &str) -> GeneratorError {
    GeneratorError::InvalidResponse {
        reason: reason.into(),
        body: body.to_string(),
    }
}

fn interpret_value(value: Value, body: &str) -> Result<GeneratedModel, GeneratorError> {
    let Value::Object(map) = &value else {
        return Err(invalid("response is not a JSON object", body));
    };

    let Some(success) = map.get("success") else {
        let model = read_model(&value, body)?;
        return Ok(GeneratedModel {
            model,
            payload: value,
        });
    };

    if success.as_bool() != Some(true) {
        let message = map
            .get("error")
            .and_then(Value::as_str)
            .or_else(|| map.get("model").and_then(|m| m.get("error")).and_then(Value::as_str))
            .unwrap_or("generator reported failure")
            .to_string();
        return Err(GeneratorError::Rejected {
            message,
            payload: Some(value),
        });
    }

    let model = match map.get("model") {
        Some(Value::String(text)) => parse_lenient(text)
            .ok_or_else(|| invalid("model field holds no JSON object", body))?,
        Some(model) => model.clone(),
        None => return Err(invalid("success response without a model", body)),
    };
    let raw = read_model(&model, body)?;
    Ok(GeneratedModel {
        model: raw,
        payload: model,
    })
}

fn read_model(value: &Value, body: &str) -> Result<RawModel, GeneratorError> {
    let document =
        ModelDocument::from_value(value.clone()).map_err(|e| invalid(e.to_string(), body))?;
    if let ModelDocument::Canonical(raw) = &document {
        if raw.broken_sections().len() == ModelSection::ALL.len() {
            if let Some(message) = value.get("error").and_then(Value::as_str) {
                return Err(GeneratorError::Rejected {
                    message: message.to_string(),
                    payload: Some(value.clone()),
                });
            }
            return Err(invalid("object has no model sections", body));
        }
    }
    document.into_raw().map_err(|e| invalid(e.to_string(), body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_success() {
        let body = json!({
            "success": true,
            "model": {"model_actions": [], "model_objects": [], "model_connections": []}
        })
        .to_string();
        let generated = interpret_response(&body).unwrap();
        assert!(generated.model.broken_sections().is_empty());
        assert!(generated.payload.get("model_actions").is_some());
    }

    #[test]
    fn envelope_failure_is_rejected_with_payload() {
        let body = json!({"success": false, "error": "quota"}).to_string();
        match interpret_response(&body).unwrap_err() {
            GeneratorError::Rejected { message, payload } => {
                assert_eq!(message, "quota");
                assert_eq!(payload.unwrap()["error"], "quota");
            }
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn nested_error_in_model() {
        let body = json!({"success": false, "model": {"error": "bad prompt"}}).to_string();
        let err = interpret_response(&body).unwrap_err();
        assert!(err.to_string().contains("bad prompt"));
    }

    #[test]
    fn json_embedded_in_prose_is_recovered() {
        let body = "Here is the model:\n{\"model_actions\": [], \"model_objects\": [], \
                    \"model_connections\": []}\nHope this helps.";
        assert!(interpret_response(body).is_ok());
    }

    #[test]
    fn model_as_string_is_recovered() {
        let inner = "```json\n{\"model_actions\": [], \"model_objects\": [], \"model_connections\": []}\n```";
        let body = json!({"success": true, "model": inner}).to_string();
        assert!(interpret_response(&body).is_ok());
    }

    #[test]
    fn bare_legacy_model_is_accepted() {
        let body = json!({"Login": {"init_states": ["User: anonymous"], "final_states": []}})
            .to_string();
        let generated = interpret_response(&body).unwrap();
        assert_eq!(generated.model.actions.items().len(), 1);
    }

    #[test]
    fn garbage_is_invalid() {
        let err = interpret_response("internal server error").unwrap_err();
        assert!(matches!(err, GeneratorError::InvalidResponse { .. }));
        assert_eq!(err.payload(), Some(json!("internal server error")));

        let err = interpret_response("{\"unrelated\": 1}").unwrap_err();
        assert!(matches!(err, GeneratorError::InvalidResponse { .. }));
    }

    #[test]
    fn bare_error_object_is_rejected() {
        let err = interpret_response("{\"error\": \"model overloaded\"}").unwrap_err();
        assert!(matches!(err, GeneratorError::Rejected { .. }));
    }
}
