//! Loosely typed model as it arrives from generators, editors and disk.
//!
//! Nothing here is validated: a section may be missing or not an array, ids
//! may be absent, malformed, or sent as numbers. [`RawModel::from_value`]
//! never fails; the validator reports what is wrong with the result.

use crate::model::{Links, ModelSection};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// One top-level array of the wire format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Section<T> {
    Missing,
    /// Present but not an array; holds the JSON type name found instead.
    NotAnArray(&'static str),
    Items(Vec<T>),
}

impl<T> Default for Section<T> {
    fn default() -> Self {
        Section::Items(Vec::new())
    }
}

impl<T> Section<T> {
    /// Items, or an empty slice when the section is broken.
    pub fn items(&self) -> &[T] {
        match self {
            Section::Items(items) => items,
            _ => &[],
        }
    }

    pub fn items_mut(&mut self) -> Option<&mut Vec<T>> {
        match self {
            Section::Items(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Section::Items(_))
    }
}

impl<T> From<Vec<T>> for Section<T> {
    fn from(items: Vec<T>) -> Self {
        Section::Items(items)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawAction {
    pub id: Option<String>,
    pub name: Option<String>,
    pub links: Option<Links>,
    /// Chunk index that produced this entity; never serialized.
    pub origin: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawState {
    pub id: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawObject {
    pub id: Option<String>,
    pub name: Option<String>,
    /// `None` when `resource_state` is absent or not an array.
    pub states: Option<Vec<RawState>>,
    pub links: Option<Links>,
    pub origin: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawConnection {
    pub from: Option<String>,
    pub to: Option<String>,
    pub label: Option<String>,
    pub origin: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawModel {
    pub actions: Section<RawAction>,
    pub objects: Section<RawObject>,
    pub connections: Section<RawConnection>,
}

// ============================================================================
// JSON decoding
// ============================================================================

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Id fields accept strings and numbers; blank strings count as missing.
fn id_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn text_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn links_field(map: &Map<String, Value>, key: &str) -> Option<Links> {
    let links = map.get(key)?.as_object()?;
    Some(Links {
        manual: text_field(links, "manual").unwrap_or_default(),
        api: text_field(links, "API").unwrap_or_default(),
        ui: text_field(links, "UI").unwrap_or_default(),
    })
}

fn section<T>(
    root: &Map<String, Value>,
    which: ModelSection,
    decode: impl Fn(&Map<String, Value>) -> T,
) -> Section<T> {
    match root.get(which.key()) {
        None => Section::Missing,
        Some(Value::Array(items)) => Section::Items(
            items
                .iter()
                .map(|item| match item {
                    Value::Object(map) => decode(map),
                    _ => decode(&Map::new()),
                })
                .collect(),
        ),
        Some(other) => Section::NotAnArray(json_type(other)),
    }
}

fn decode_action(map: &Map<String, Value>) -> RawAction {
    RawAction {
        id: id_field(map, "action_id"),
        name: text_field(map, "action_name"),
        links: links_field(map, "action_links"),
        origin: None,
    }
}

fn decode_state(map: &Map<String, Value>) -> RawState {
    RawState {
        id: id_field(map, "state_id"),
        name: text_field(map, "state_name"),
    }
}

fn decode_object(map: &Map<String, Value>) -> RawObject {
    let states = match map.get("resource_state") {
        Some(Value::Array(states)) => Some(
            states
                .iter()
                .map(|s| match s {
                    Value::Object(state) => decode_state(state),
                    _ => RawState::default(),
                })
                .collect(),
        ),
        _ => None,
    };
    RawObject {
        id: id_field(map, "object_id"),
        name: text_field(map, "object_name"),
        states,
        links: links_field(map, "object_links"),
        origin: None,
    }
}

fn decode_connection(map: &Map<String, Value>) -> RawConnection {
    RawConnection {
        from: id_field(map, "connection_out"),
        to: id_field(map, "connection_in"),
        label: text_field(map, "connection_label"),
        origin: None,
    }
}

// ============================================================================
// JSON encoding
// ============================================================================

fn put(map: &mut Map<String, Value>, key: &str, value: &Option<String>) {
    if let Some(v) = value {
        map.insert(key.to_string(), Value::String(v.clone()));
    }
}

fn put_links(map: &mut Map<String, Value>, key: &str, links: &Option<Links>) {
    if let Some(links) = links {
        if let Ok(value) = serde_json::to_value(links) {
            map.insert(key.to_string(), value);
        }
    }
}

fn encode_section<T>(
    root: &mut Map<String, Value>,
    which: ModelSection,
    section: &Section<T>,
    encode: impl Fn(&T) -> Map<String, Value>,
) {
    if let Section::Items(items) = section {
        let values = items.iter().map(|i| Value::Object(encode(i))).collect();
        root.insert(which.key().to_string(), Value::Array(values));
    }
}

impl RawModel {
    /// Decode any JSON value. Non-object input yields a model whose sections
    /// are all missing.
    pub fn from_value(value: &Value) -> RawModel {
        let empty = Map::new();
        let root = value.as_object().unwrap_or(&empty);
        RawModel {
            actions: section(root, ModelSection::Actions, decode_action),
            objects: section(root, ModelSection::Objects, decode_object),
            connections: section(root, ModelSection::Connections, decode_connection),
        }
    }

    /// Encode back to the wire format. Broken sections are omitted and absent
    /// fields are left out rather than defaulted.
    pub fn to_value(&self) -> Value {
        let mut root = Map::new();
        encode_section(&mut root, ModelSection::Actions, &self.actions, |a| {
            let mut m = Map::new();
            put(&mut m, "action_id", &a.id);
            put(&mut m, "action_name", &a.name);
            put_links(&mut m, "action_links", &a.links);
            m
        });
        encode_section(&mut root, ModelSection::Objects, &self.objects, |o| {
            let mut m = Map::new();
            put(&mut m, "object_id", &o.id);
            put(&mut m, "object_name", &o.name);
            if let Some(states) = &o.states {
                let states = states
                    .iter()
                    .map(|s| {
                        let mut sm = Map::new();
                        put(&mut sm, "state_id", &s.id);
                        put(&mut sm, "state_name", &s.name);
                        Value::Object(sm)
                    })
                    .collect();
                m.insert("resource_state".to_string(), Value::Array(states));
            }
            put_links(&mut m, "object_links", &o.links);
            m
        });
        encode_section(&mut root, ModelSection::Connections, &self.connections, |c| {
            let mut m = Map::new();
            put(&mut m, "connection_out", &c.from);
            put(&mut m, "connection_in", &c.to);
            put(&mut m, "connection_label", &c.label);
            m
        });
        Value::Object(root)
    }

    /// Sections that are missing or not arrays.
    pub fn broken_sections(&self) -> Vec<ModelSection> {
        let mut broken = Vec::new();
        if !self.actions.is_array() {
            broken.push(ModelSection::Actions);
        }
        if !self.objects.is_array() {
            broken.push(ModelSection::Objects);
        }
        if !self.connections.is_array() {
            broken.push(ModelSection::Connections);
        }
        broken
    }

    /// Tag every entity with the chunk index that produced it.
    pub fn with_origin(mut self, origin: usize) -> RawModel {
        for action in self.actions.items_mut().into_iter().flatten() {
            action.origin = Some(origin);
        }
        for object in self.objects.items_mut().into_iter().flatten() {
            object.origin = Some(origin);
        }
        for connection in self.connections.items_mut().into_iter().flatten() {
            connection.origin = Some(origin);
        }
        self
    }
}

impl Serialize for RawModel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RawModel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(RawModel::from_value(&value))
    }
}
