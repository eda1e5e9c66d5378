//! Graph/Model Biconverter
//!
//! The editor works on nodes and edges:
//!
//! ```text
//!   [object o00001] --has_state--> [state o00001s00001 "User: anonymous"]
//!                                         |
//!                                    transition
//!                                         v
//!                                  [action a00001 "Login"]
//! ```
//!
//! [`to_graph`] renders a canonical model; [`to_model`] reads an edited
//! graph back into a raw model for the pipeline to canonicalize.

use crate::ids::{composite, decompose_composite};
use crate::model::{Links, Model};
use crate::raw::{RawAction, RawConnection, RawModel, RawObject, RawState, Section};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Action,
    Object,
    State,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    HasState,
    /// Editor-created edges carry no type and are transitions.
    #[default]
    Transition,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Links>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(rename = "type", default)]
    pub kind: EdgeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Graph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// `"<object name>: <state name>"`
pub fn state_label(object_name: &str, state_name: &str) -> String {
    format!("{object_name}: {state_name}")
}

/// Edge ids are `from->to`, with `#n` appended for parallel edges.
struct EdgeIds {
    used: HashMap<String, usize>,
}

impl EdgeIds {
    fn new() -> Self {
        Self {
            used: HashMap::new(),
        }
    }

    fn next(&mut self, from: &str, to: &str) -> String {
        let base = format!("{from}->{to}");
        let count = self.used.entry(base.clone()).or_default();
        *count += 1;
        if *count == 1 {
            base
        } else {
            format!("{base}#{count}")
        }
    }
}

pub fn to_graph(model: &Model) -> Graph {
    let mut graph = Graph::default();
    let mut edge_ids = EdgeIds::new();

    for action in &model.actions {
        graph.nodes.push(GraphNode {
            id: action.id.to_string(),
            label: action.name.clone(),
            kind: NodeKind::Action,
            links: Some(action.links.clone()),
        });
    }

    for object in &model.objects {
        let object_id = object.id.to_string();
        graph.nodes.push(GraphNode {
            id: object_id.clone(),
            label: object.name.clone(),
            kind: NodeKind::Object,
            links: Some(object.links.clone()),
        });
        for state in &object.states {
            let node_id = composite(object.id.as_str(), state.id.as_str());
            graph.nodes.push(GraphNode {
                id: node_id.clone(),
                label: state_label(&object.name, &state.name),
                kind: NodeKind::State,
                links: None,
            });
            graph.edges.push(GraphEdge {
                id: edge_ids.next(&object_id, &node_id),
                source: object_id.clone(),
                target: node_id,
                kind: EdgeKind::HasState,
                label: None,
            });
        }
    }

    for connection in &model.connections {
        let from = connection.from.to_string();
        let to = connection.to.to_string();
        graph.edges.push(GraphEdge {
            id: edge_ids.next(&from, &to),
            source: from,
            target: to,
            kind: EdgeKind::Transition,
            label: connection.label.clone(),
        });
    }

    graph
}

/// Working copy of one object while reading a graph back.
struct ObjectEntry {
    id: Option<String>,
    name: String,
    links: Option<Links>,
    states: Vec<RawState>,
}

/// Strip `"<object name>:"` from a state label. When the owner's name is
/// unknown the label is split at its first colon.
fn state_name_from_label(label: &str, owner_name: Option<&str>) -> (Option<String>, String) {
    if let Some(owner) = owner_name {
        if let Some(rest) = label.strip_prefix(owner).and_then(|r| r.strip_prefix(':')) {
            return (Some(owner.to_string()), rest.trim().to_string());
        }
    }
    match label.split_once(':') {
        Some((object, state)) if owner_name.is_none() => {
            (Some(object.trim().to_string()), state.trim().to_string())
        }
        _ => (None, label.trim().to_string()),
    }
}

pub fn to_model(graph: &Graph) -> RawModel {
    let kinds: HashMap<&str, NodeKind> =
        graph.nodes.iter().map(|n| (n.id.as_str(), n.kind)).collect();

    let mut actions = Vec::new();
    let mut objects: Vec<ObjectEntry> = Vec::new();
    let mut object_index: HashMap<String, usize> = HashMap::new();

    for node in &graph.nodes {
        match node.kind {
            NodeKind::Action => actions.push(RawAction {
                id: Some(node.id.clone()),
                name: Some(node.label.clone()),
                links: node.links.clone(),
                origin: None,
            }),
            NodeKind::Object => {
                object_index.insert(node.id.clone(), objects.len());
                objects.push(ObjectEntry {
                    id: Some(node.id.clone()),
                    name: node.label.clone(),
                    links: node.links.clone(),
                    states: Vec::new(),
                });
            }
            NodeKind::State => {}
        }
    }

    // Owner of each state node per `has_state` edges (or any object -> state edge).
    let mut owners: HashMap<&str, &str> = HashMap::new();
    let mut ownership_edges: HashSet<&str> = HashSet::new();
    for edge in &graph.edges {
        let pair = (
            kinds.get(edge.source.as_str()),
            kinds.get(edge.target.as_str()),
        );
        let owned = match pair {
            (Some(NodeKind::Object), Some(NodeKind::State)) => Some((&edge.target, &edge.source)),
            (Some(NodeKind::State), Some(NodeKind::Object)) => Some((&edge.source, &edge.target)),
            _ => None,
        };
        if let Some((state, object)) = owned {
            owners.entry(state.as_str()).or_insert(object.as_str());
            ownership_edges.insert(edge.id.as_str());
        }
    }

    let known_objects: Vec<String> = object_index.keys().cloned().collect();
    let mut node_refs: HashMap<&str, String> = HashMap::new();

    for node in graph.nodes.iter().filter(|n| n.kind == NodeKind::State) {
        let (owner, state_id) = match owners.get(node.id.as_str()) {
            Some(owner) => {
                let state_id = match node.id.strip_prefix(owner) {
                    Some(rest) if !rest.is_empty() => rest.to_string(),
                    _ => node.id.clone(),
                };
                (Some(owner.to_string()), Some(state_id))
            }
            None => match decompose_composite(&node.id, known_objects.iter().map(String::as_str)) {
                Some(parts) => (Some(parts.object_id), Some(parts.state_id)),
                None => (None, None),
            },
        };

        let owner_name = owner
            .as_ref()
            .and_then(|o| object_index.get(o))
            .map(|&i| objects[i].name.clone());
        let (label_object, state_name) = state_name_from_label(&node.label, owner_name.as_deref());

        let index = match owner.as_ref().and_then(|o| object_index.get(o)) {
            Some(&i) => i,
            None => {
                // Owner not among the object nodes: create it from the
                // composite prefix and the label.
                objects.push(ObjectEntry {
                    id: owner.clone(),
                    name: label_object.unwrap_or_default(),
                    links: None,
                    states: Vec::new(),
                });
                if let Some(owner) = &owner {
                    object_index.insert(owner.clone(), objects.len() - 1);
                }
                objects.len() - 1
            }
        };

        let object = &objects[index];
        let reference = match (&object.id, &state_id) {
            (Some(object_id), Some(state_id)) => composite(object_id, state_id),
            _ => node.id.clone(),
        };
        node_refs.insert(node.id.as_str(), reference);
        objects[index].states.push(RawState {
            id: state_id.filter(|s| !s.is_empty()),
            name: Some(state_name),
        });
    }

    let connections = graph
        .edges
        .iter()
        .filter(|e| e.kind == EdgeKind::Transition && !ownership_edges.contains(e.id.as_str()))
        .map(|edge| RawConnection {
            from: Some(
                node_refs
                    .get(edge.source.as_str())
                    .cloned()
                    .unwrap_or_else(|| edge.source.clone()),
            ),
            to: Some(
                node_refs
                    .get(edge.target.as_str())
                    .cloned()
                    .unwrap_or_else(|| edge.target.clone()),
            ),
            label: edge.label.clone(),
            origin: None,
        })
        .collect();

    let objects = objects
        .into_iter()
        .map(|o| RawObject {
            id: o.id,
            name: Some(o.name),
            states: Some(o.states),
            links: o.links,
            origin: None,
        })
        .collect();

    RawModel {
        actions: Section::Items(actions),
        objects: Section::Items(objects),
        connections: Section::Items(connections),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn login() -> Model {
        serde_json::from_value(json!({
            "model_actions": [
                {"action_id": "a00001", "action_name": "Login",
                 "action_links": {"manual": "docs/login", "API": "", "UI": ""}}
            ],
            "model_objects": [
                {"object_id": "o00001", "object_name": "User",
                 "resource_state": [
                    {"state_id": "s00001", "state_name": "anonymous"},
                    {"state_id": "s00002", "state_name": "authenticated"}
                 ],
                 "object_links": {"manual": "", "API": "", "UI": ""}},
                {"object_id": "o00002", "object_name": "Audit",
                 "resource_state": [{"state_id": "s00000", "state_name": "null"}],
                 "object_links": {"manual": "", "API": "", "UI": ""}}
            ],
            "model_connections": [
                {"connection_out": "o00001s00001", "connection_in": "a00001"},
                {"connection_out": "a00001", "connection_in": "o00001s00002"},
                {"connection_out": "a00001", "connection_in": "o00001s00002", "connection_label": "again"}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn renders_nodes_and_edges() {
        let graph = to_graph(&login());
        let state = graph
            .nodes
            .iter()
            .find(|n| n.id == "o00001s00002")
            .unwrap();
        assert_eq!(state.label, "User: authenticated");
        assert_eq!(state.kind, NodeKind::State);
        assert!(graph.nodes.iter().any(|n| n.label == "Audit: null"));

        let has_state = graph
            .edges
            .iter()
            .filter(|e| e.kind == EdgeKind::HasState)
            .count();
        assert_eq!(has_state, 3);

        let ids: Vec<&str> = graph
            .edges
            .iter()
            .filter(|e| e.kind == EdgeKind::Transition)
            .map(|e| e.id.as_str())
            .collect();
        assert_eq!(
            ids,
            vec![
                "o00001s00001->a00001",
                "a00001->o00001s00002",
                "a00001->o00001s00002#2"
            ]
        );
    }

    #[test]
    fn round_trip_is_lossless() {
        let model = login();
        let back = Model::try_from(&to_model(&to_graph(&model))).unwrap();
        assert_eq!(back.sorted(), model.sorted());
    }

    #[test]
    fn graph_json_shape() {
        let value = serde_json::to_value(to_graph(&login())).unwrap();
        assert_eq!(value["nodes"][0]["type"], "action");
        assert_eq!(value["nodes"][0]["links"]["manual"], "docs/login");
        assert_eq!(value["edges"][0]["type"], "has_state");
    }

    #[test]
    fn editor_state_with_bare_id_is_prefixed() {
        let graph: Graph = serde_json::from_value(json!({
            "nodes": [
                {"id": "o00001", "label": "Order", "type": "object"},
                {"id": "s00004", "label": "Order: shipped", "type": "state"},
                {"id": "a00001", "label": "Ship", "type": "action"}
            ],
            "edges": [
                {"id": "e1", "source": "o00001", "target": "s00004", "type": "has_state"},
                {"id": "e2", "source": "a00001", "target": "s00004"}
            ]
        }))
        .unwrap();
        let raw = to_model(&graph);
        let object = &raw.objects.items()[0];
        let state = &object.states.as_ref().unwrap()[0];
        assert_eq!(state.id.as_deref(), Some("s00004"));
        assert_eq!(state.name.as_deref(), Some("shipped"));
        let connection = &raw.connections.items()[0];
        assert_eq!(connection.to.as_deref(), Some("o00001s00004"));
    }

    #[test]
    fn state_without_object_node_creates_owner() {
        let graph: Graph = serde_json::from_value(json!({
            "nodes": [
                {"id": "o00003s00001", "label": "Invoice: sent", "type": "state"}
            ],
            "edges": []
        }))
        .unwrap();
        let raw = to_model(&graph);
        let object = &raw.objects.items()[0];
        assert_eq!(object.id.as_deref(), Some("o00003"));
        assert_eq!(object.name.as_deref(), Some("Invoice"));
        assert_eq!(
            object.states.as_ref().unwrap()[0].name.as_deref(),
            Some("sent")
        );
    }

    #[test]
    fn label_with_colon_in_object_name() {
        assert_eq!(
            state_name_from_label("A:B: x", Some("A:B")),
            (Some("A:B".to_string()), "x".to_string())
        );
        assert_eq!(
            state_name_from_label("no colon", Some("Other")),
            (None, "no colon".to_string())
        );
    }
}
