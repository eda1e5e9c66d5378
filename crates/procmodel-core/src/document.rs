//! Incoming document shapes.
//!
//! A document is parsed once into an explicit variant instead of being
//! re-sniffed at every use site:
//!
//! ```text
//!   { "model_actions": [..], .. }                      -> Canonical
//!   { "Login": { "init_states": [..],
//!                "final_states": [..] }, .. }          -> Legacy
//! ```
//!
//! Legacy documents are converted into a [`RawModel`] with positional ids
//! before they reach the pipeline.

use crate::ids::{composite, IdAllocator, IdError, IdKind};
use crate::model::ModelSection;
use crate::raw::{RawAction, RawConnection, RawModel, RawObject, RawState, Section};
use serde_json::{Map, Value};

/// State name used when a legacy state string has no `Object:` prefix.
pub const LEGACY_DEFAULT_STATE: &str = "state";

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("document root must be a JSON object, found {0}")]
    NotAnObject(&'static str),
    #[error("legacy conversion failed: {0}")]
    Legacy(#[from] IdError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyAction {
    pub name: String,
    pub init_states: Vec<String>,
    pub final_states: Vec<String>,
}

/// Action-keyed legacy format; action order follows the document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegacyModel {
    pub actions: Vec<LegacyAction>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelDocument {
    Canonical(RawModel),
    Legacy(LegacyModel),
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn is_legacy(root: &Map<String, Value>) -> bool {
    !root.is_empty()
        && root.values().all(Value::is_object)
        && root.values().any(|v| {
            v.as_object()
                .is_some_and(|a| a.contains_key("init_states") || a.contains_key("final_states"))
        })
}

impl ModelDocument {
    pub fn parse_str(input: &str) -> Result<Self, ParseError> {
        let value: Value = serde_json::from_str(input)?;
        Self::from_value(value)
    }

    /// Canonical shape is tried first: any of the three section keys selects
    /// it. Objects without section keys or legacy markers are treated as
    /// canonical too, so the validator reports the missing sections.
    pub fn from_value(value: Value) -> Result<Self, ParseError> {
        let root = match &value {
            Value::Object(root) => root,
            other => {
                return Err(ParseError::NotAnObject(match other {
                    Value::Array(_) => "array",
                    Value::String(_) => "string",
                    Value::Number(_) => "number",
                    Value::Bool(_) => "boolean",
                    _ => "null",
                }))
            }
        };

        let canonical = ModelSection::ALL.iter().any(|s| root.contains_key(s.key()));
        if !canonical && is_legacy(root) {
            let actions = root
                .iter()
                .map(|(name, body)| LegacyAction {
                    name: name.clone(),
                    init_states: string_list(body.get("init_states")),
                    final_states: string_list(body.get("final_states")),
                })
                .collect();
            return Ok(ModelDocument::Legacy(LegacyModel { actions }));
        }
        Ok(ModelDocument::Canonical(RawModel::from_value(&value)))
    }

    pub fn into_raw(self) -> Result<RawModel, ParseError> {
        match self {
            ModelDocument::Canonical(raw) => Ok(raw),
            ModelDocument::Legacy(legacy) => Ok(legacy.to_raw()?),
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, ModelDocument::Legacy(_))
    }
}

/// Split `"Object: state"` at the first colon. Without a colon the whole
/// string names the object and the state gets the default name.
fn split_state_ref(value: &str) -> (String, String) {
    match value.split_once(':') {
        Some((object, state)) => {
            let state = state.trim();
            let state = if state.is_empty() {
                LEGACY_DEFAULT_STATE
            } else {
                state
            };
            (object.trim().to_string(), state.to_string())
        }
        None => (value.trim().to_string(), LEGACY_DEFAULT_STATE.to_string()),
    }
}

struct LegacyObject {
    id: String,
    name: String,
    states: Vec<(String, String)>,
    allocator: IdAllocator,
}

/// Find or create the object and state named by a legacy state string and
/// return its composite id.
fn legacy_state_ref(
    objects: &mut Vec<LegacyObject>,
    object_ids: &mut IdAllocator,
    value: &str,
) -> Result<String, IdError> {
    let (object_name, state_name) = split_state_ref(value);
    let index = match objects.iter().position(|o| o.name == object_name) {
        Some(index) => index,
        None => {
            let id = object_ids.claim(objects.len() as u32 + 1)?;
            objects.push(LegacyObject {
                id,
                name: object_name,
                states: Vec::new(),
                allocator: IdAllocator::new(IdKind::State),
            });
            objects.len() - 1
        }
    };
    let object = &mut objects[index];
    let state_id = match object.states.iter().find(|(_, name)| *name == state_name) {
        Some((id, _)) => id.clone(),
        None => {
            let seed = object.states.len() as u32 + 1;
            let id = object.allocator.claim(seed)?;
            object.states.push((id.clone(), state_name));
            id
        }
    };
    Ok(composite(&object.id, &state_id))
}

impl LegacyModel {
    /// Assign ids exactly as the normalizer would for entities without ids:
    /// the 1-based position in first-seen order.
    pub fn to_raw(&self) -> Result<RawModel, IdError> {
        let mut action_ids = IdAllocator::new(IdKind::Action);
        let mut object_ids = IdAllocator::new(IdKind::Object);
        let mut objects: Vec<LegacyObject> = Vec::new();
        let mut actions = Vec::new();
        let mut connections = Vec::new();

        for (position, action) in self.actions.iter().enumerate() {
            let action_id = action_ids.claim(position as u32 + 1)?;
            for state in &action.init_states {
                let node = legacy_state_ref(&mut objects, &mut object_ids, state)?;
                connections.push(RawConnection {
                    from: Some(node),
                    to: Some(action_id.clone()),
                    ..RawConnection::default()
                });
            }
            for state in &action.final_states {
                let node = legacy_state_ref(&mut objects, &mut object_ids, state)?;
                connections.push(RawConnection {
                    from: Some(action_id.clone()),
                    to: Some(node),
                    ..RawConnection::default()
                });
            }
            actions.push(RawAction {
                id: Some(action_id),
                name: Some(action.name.clone()),
                ..RawAction::default()
            });
        }

        let objects = objects
            .into_iter()
            .map(|o| RawObject {
                id: Some(o.id),
                name: Some(o.name),
                states: Some(
                    o.states
                        .into_iter()
                        .map(|(id, name)| RawState {
                            id: Some(id),
                            name: Some(name),
                        })
                        .collect(),
                ),
                ..RawObject::default()
            })
            .collect();

        Ok(RawModel {
            actions: Section::Items(actions),
            objects: Section::Items(objects),
            connections: Section::Items(connections),
        })
    }
}
