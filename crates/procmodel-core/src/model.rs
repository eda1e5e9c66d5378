//! Canonical process model.
//!
//! Only the pipeline builds these values. Every id field is a newtype from
//! [`crate::ids`], so a `Model` cannot hold a malformed identifier; the
//! remaining invariants (uniqueness, resolved endpoints, null states) are
//! established by the normalizer and resolver before conversion.

use crate::ids::{composite, ActionId, IdError, IdKind, NodeRef, ObjectId, StateId};
use crate::raw::{RawAction, RawConnection, RawModel, RawObject, RawState, Section};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Documentation / interface pointers attached to actions and objects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Links {
    #[serde(default)]
    pub manual: String,
    #[serde(rename = "API", default)]
    pub api: String,
    #[serde(rename = "UI", default)]
    pub ui: String,
}

impl Links {
    pub fn is_empty(&self) -> bool {
        self.manual.is_empty() && self.api.is_empty() && self.ui.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "action_id")]
    pub id: ActionId,
    #[serde(rename = "action_name")]
    pub name: String,
    #[serde(rename = "action_links", default)]
    pub links: Links,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    #[serde(rename = "state_id")]
    pub id: StateId,
    #[serde(rename = "state_name")]
    pub name: String,
}

impl State {
    pub fn null() -> Self {
        Self {
            id: StateId::null(),
            name: crate::ids::NULL_STATE_NAME.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Object {
    #[serde(rename = "object_id")]
    pub id: ObjectId,
    #[serde(rename = "object_name")]
    pub name: String,
    #[serde(rename = "resource_state")]
    pub states: Vec<State>,
    #[serde(rename = "object_links", default)]
    pub links: Links,
}

impl Object {
    pub fn state(&self, id: &StateId) -> Option<&State> {
        self.states.iter().find(|s| &s.id == id)
    }

    /// Composite ids of every state, in state order.
    pub fn composite_ids(&self) -> impl Iterator<Item = String> + '_ {
        self.states
            .iter()
            .map(move |s| composite(self.id.as_str(), s.id.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Connection {
    #[serde(rename = "connection_out")]
    pub from: NodeRef,
    #[serde(rename = "connection_in")]
    pub to: NodeRef,
    #[serde(
        rename = "connection_label",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub label: Option<String>,
}

impl Connection {
    pub fn is_self_loop(&self) -> bool {
        self.from == self.to
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    #[serde(rename = "model_actions")]
    pub actions: Vec<Action>,
    #[serde(rename = "model_objects")]
    pub objects: Vec<Object>,
    #[serde(rename = "model_connections")]
    pub connections: Vec<Connection>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ModelStats {
    pub actions: usize,
    pub objects: usize,
    pub states: usize,
    pub connections: usize,
}

impl fmt::Display for ModelStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} actions, {} objects, {} states, {} connections",
            self.actions, self.objects, self.states, self.connections
        )
    }
}

impl Model {
    pub fn action(&self, id: &ActionId) -> Option<&Action> {
        self.actions.iter().find(|a| &a.id == id)
    }

    pub fn object(&self, id: &ObjectId) -> Option<&Object> {
        self.objects.iter().find(|o| &o.id == id)
    }

    pub fn contains_node(&self, node: &NodeRef) -> bool {
        match node {
            NodeRef::Action(id) => self.action(id).is_some(),
            NodeRef::State(object, state) => self
                .object(object)
                .is_some_and(|o| o.state(state).is_some()),
        }
    }

    pub fn stats(&self) -> ModelStats {
        ModelStats {
            actions: self.actions.len(),
            objects: self.objects.len(),
            states: self.objects.iter().map(|o| o.states.len()).sum(),
            connections: self.connections.len(),
        }
    }

    /// Copy with every sequence sorted by id; two models that differ only in
    /// array order compare equal after this.
    pub fn sorted(&self) -> Model {
        let mut model = self.clone();
        model.actions.sort_by(|a, b| a.id.cmp(&b.id));
        model.objects.sort_by(|a, b| a.id.cmp(&b.id));
        for object in &mut model.objects {
            object.states.sort_by(|a, b| a.id.cmp(&b.id));
        }
        model.connections.sort();
        model
    }

    /// Set of every node id (actions and composite states).
    pub fn node_ids(&self) -> BTreeSet<String> {
        let mut ids: BTreeSet<String> =
            self.actions.iter().map(|a| a.id.to_string()).collect();
        for object in &self.objects {
            ids.extend(object.composite_ids());
        }
        ids
    }

    pub fn to_raw(&self) -> RawModel {
        RawModel::from(self)
    }
}

// ============================================================================
// Raw <-> canonical
// ============================================================================

/// Which top-level array a location refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSection {
    Actions,
    Objects,
    Connections,
}

impl ModelSection {
    pub const ALL: [ModelSection; 3] = [
        ModelSection::Actions,
        ModelSection::Objects,
        ModelSection::Connections,
    ];

    /// JSON key of the section.
    pub fn key(self) -> &'static str {
        match self {
            ModelSection::Actions => "model_actions",
            ModelSection::Objects => "model_objects",
            ModelSection::Connections => "model_connections",
        }
    }
}

impl fmt::Display for ModelSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelConversionError {
    #[error("section {0} is missing or not an array")]
    Section(ModelSection),
    #[error("{location}: missing {kind} id")]
    MissingId { location: String, kind: IdKind },
    #[error("{location}: {source}")]
    InvalidId { location: String, source: IdError },
}

fn required_id<T>(
    value: &Option<String>,
    kind: IdKind,
    location: impl FnOnce() -> String,
    parse: impl FnOnce(String) -> Result<T, IdError>,
) -> Result<T, ModelConversionError> {
    match value {
        None => Err(ModelConversionError::MissingId {
            location: location(),
            kind,
        }),
        Some(raw) => parse(raw.clone()).map_err(|source| ModelConversionError::InvalidId {
            location: location(),
            source,
        }),
    }
}

fn section_items<T>(
    section: &Section<T>,
    which: ModelSection,
) -> Result<&[T], ModelConversionError> {
    match section {
        Section::Items(items) => Ok(items),
        _ => Err(ModelConversionError::Section(which)),
    }
}

impl TryFrom<&RawModel> for Model {
    type Error = ModelConversionError;

    /// Strict conversion: every id must already be canonical. Uniqueness and
    /// endpoint resolution are not checked here.
    fn try_from(raw: &RawModel) -> Result<Self, Self::Error> {
        let mut model = Model::default();

        for (i, action) in section_items(&raw.actions, ModelSection::Actions)?
            .iter()
            .enumerate()
        {
            let id = required_id(
                &action.id,
                IdKind::Action,
                || format!("model_actions[{i}]"),
                ActionId::try_from,
            )?;
            model.actions.push(Action {
                id,
                name: action.name.clone().unwrap_or_default(),
                links: action.links.clone().unwrap_or_default(),
            });
        }

        for (i, object) in section_items(&raw.objects, ModelSection::Objects)?
            .iter()
            .enumerate()
        {
            let id = required_id(
                &object.id,
                IdKind::Object,
                || format!("model_objects[{i}]"),
                ObjectId::try_from,
            )?;
            let mut states = Vec::new();
            for (j, state) in object.states.iter().flatten().enumerate() {
                let state_id = required_id(
                    &state.id,
                    IdKind::State,
                    || format!("model_objects[{i}].resource_state[{j}]"),
                    StateId::try_from,
                )?;
                states.push(State {
                    id: state_id,
                    name: state.name.clone().unwrap_or_default(),
                });
            }
            model.objects.push(Object {
                id,
                name: object.name.clone().unwrap_or_default(),
                states,
                links: object.links.clone().unwrap_or_default(),
            });
        }

        for (i, connection) in section_items(&raw.connections, ModelSection::Connections)?
            .iter()
            .enumerate()
        {
            let from = required_id(
                &connection.from,
                IdKind::Action,
                || format!("model_connections[{i}].connection_out"),
                NodeRef::try_from,
            )?;
            let to = required_id(
                &connection.to,
                IdKind::Action,
                || format!("model_connections[{i}].connection_in"),
                NodeRef::try_from,
            )?;
            model.connections.push(Connection {
                from,
                to,
                label: connection.label.clone(),
            });
        }

        Ok(model)
    }
}

impl From<&Model> for RawModel {
    fn from(model: &Model) -> Self {
        RawModel {
            actions: Section::Items(
                model
                    .actions
                    .iter()
                    .map(|a| RawAction {
                        id: Some(a.id.to_string()),
                        name: Some(a.name.clone()),
                        links: Some(a.links.clone()),
                        origin: None,
                    })
                    .collect(),
            ),
            objects: Section::Items(
                model
                    .objects
                    .iter()
                    .map(|o| RawObject {
                        id: Some(o.id.to_string()),
                        name: Some(o.name.clone()),
                        states: Some(
                            o.states
                                .iter()
                                .map(|s| RawState {
                                    id: Some(s.id.to_string()),
                                    name: Some(s.name.clone()),
                                })
                                .collect(),
                        ),
                        links: Some(o.links.clone()),
                        origin: None,
                    })
                    .collect(),
            ),
            connections: Section::Items(
                model
                    .connections
                    .iter()
                    .map(|c| RawConnection {
                        from: Some(c.from.to_string()),
                        to: Some(c.to.to_string()),
                        label: c.label.clone(),
                        origin: None,
                    })
                    .collect(),
            ),
        }
    }
}
