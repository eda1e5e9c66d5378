//! Property-Based Tests for procmodel-core
//!
//! 1. Chunking loses no non-whitespace text and respects the size bound
//!    except for single over-long words
//! 2. Canonical output is a fixed point of the pipeline
//! 3. Ids are unique and every endpoint resolves after canonicalization
//! 4. Model -> graph -> model is lossless
//! 5. A failing chunk never changes what the others contribute

use procmodel_core::ids::{composite, NodeRef};
use procmodel_core::{
    canonicalize, merge, split, to_graph, to_model, Action, ActionId, Connection, Links, Model,
    Object, ObjectId, PartialResult, RawModel, State, StateId,
};
use proptest::prelude::*;
use serde_json::{json, Value};
use std::collections::HashSet;

// ============================================================================
// Strategies
// ============================================================================

/// Text with words, sentence ends and paragraph breaks.
fn text_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![
            4 => "[a-zA-Zé]{1,12}".prop_map(|s| s),
            2 => Just(" ".to_string()),
            1 => Just(". ".to_string()),
            1 => Just("\n".to_string()),
            1 => Just("\n\n".to_string()),
        ],
        0..120,
    )
    .prop_map(|parts| parts.concat())
}

/// Ids a generator is likely to emit: canonical, short, garbled or absent.
fn action_id_strategy() -> impl Strategy<Value = Option<Value>> {
    prop_oneof![
        Just(None),
        Just(Some(json!("a00001"))),
        Just(Some(json!("a00002"))),
        Just(Some(json!("a99999"))),
        Just(Some(json!("a2"))),
        Just(Some(json!("Action_3"))),
        Just(Some(json!(4))),
        Just(Some(json!("x"))),
    ]
}

fn object_id_strategy() -> impl Strategy<Value = Option<Value>> {
    prop_oneof![
        Just(None),
        Just(Some(json!("o00001"))),
        Just(Some(json!("o99999"))),
        Just(Some(json!("o1"))),
        Just(Some(json!("o2"))),
        Just(Some(json!("obj"))),
    ]
}

fn state_id_strategy() -> impl Strategy<Value = Option<Value>> {
    prop_oneof![
        Just(None),
        Just(Some(json!("s00001"))),
        Just(Some(json!("s1"))),
        Just(Some(json!("s2"))),
        Just(Some(json!(""))),
    ]
}

/// Connection endpoints, some resolvable, some not.
fn endpoint_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("a00001".to_string()),
        Just("a00002".to_string()),
        Just("a00007".to_string()),
        Just("o00001s00001".to_string()),
        Just("o1s1".to_string()),
        Just("o00002s00004".to_string()),
        Just("o00009s00001".to_string()),
        Just("a99999".to_string()),
        Just("o99999s00001".to_string()),
        Just("nonsense".to_string()),
    ]
}

fn with_id(mut entry: Value, key: &str, id: Option<Value>) -> Value {
    if let Some(id) = id {
        entry[key] = id;
    }
    entry
}

fn messy_model_strategy() -> impl Strategy<Value = RawModel> {
    let actions = prop::collection::vec(
        (action_id_strategy(), prop::option::of("[A-Z][a-z]{2,8}")),
        0..5,
    );
    let objects = prop::collection::vec(
        (
            object_id_strategy(),
            "[A-Z][a-z]{2,8}",
            prop::option::of(prop::collection::vec(state_id_strategy(), 0..4)),
        ),
        0..4,
    );
    let connections = prop::collection::vec((endpoint_strategy(), endpoint_strategy()), 0..6);

    (actions, objects, connections).prop_map(|(actions, objects, connections)| {
        let actions: Vec<Value> = actions
            .into_iter()
            .map(|(id, name)| {
                let entry = match name {
                    Some(name) => json!({"action_name": name}),
                    None => json!({}),
                };
                with_id(entry, "action_id", id)
            })
            .collect();
        let objects: Vec<Value> = objects
            .into_iter()
            .map(|(id, name, states)| {
                let mut entry = with_id(json!({"object_name": name}), "object_id", id);
                if let Some(states) = states {
                    let states: Vec<Value> = states
                        .into_iter()
                        .enumerate()
                        .map(|(i, sid)| {
                            with_id(json!({"state_name": format!("st{i}")}), "state_id", sid)
                        })
                        .collect();
                    entry["resource_state"] = Value::Array(states);
                }
                entry
            })
            .collect();
        let connections: Vec<Value> = connections
            .into_iter()
            .map(|(from, to)| json!({"connection_out": from, "connection_in": to}))
            .collect();
        RawModel::from_value(&json!({
            "model_actions": actions,
            "model_objects": objects,
            "model_connections": connections,
        }))
    })
}

/// A model that is already canonical.
fn canonical_model_strategy() -> impl Strategy<Value = Model> {
    let actions = prop::collection::vec("[A-Z][a-z]{2,8}", 0..4);
    let objects = prop::collection::vec(
        ("[A-Z][a-z]{2,8}", prop::collection::vec("[a-z]{1,8}", 1..4)),
        0..4,
    );
    (actions, objects)
        .prop_flat_map(|(actions, objects)| {
            let actions: Vec<Action> = actions
                .into_iter()
                .enumerate()
                .map(|(i, name)| Action {
                    id: ActionId::from_number(i as u32 + 1).unwrap(),
                    name,
                    links: Links::default(),
                })
                .collect();
            let objects: Vec<Object> = objects
                .into_iter()
                .enumerate()
                .map(|(i, (name, states))| Object {
                    id: ObjectId::from_number(i as u32 + 1).unwrap(),
                    name,
                    states: states
                        .into_iter()
                        .enumerate()
                        .map(|(j, name)| State {
                            id: StateId::from_number(j as u32 + 1).unwrap(),
                            name,
                        })
                        .collect(),
                    links: Links::default(),
                })
                .collect();

            let mut nodes: Vec<NodeRef> = actions
                .iter()
                .map(|a| NodeRef::Action(a.id.clone()))
                .collect();
            for object in &objects {
                for state in &object.states {
                    nodes.push(NodeRef::State(object.id.clone(), state.id.clone()));
                }
            }
            let edges = if nodes.is_empty() {
                Just(Vec::new()).boxed()
            } else {
                let n = nodes.len();
                prop::collection::vec((0..n, 0..n), 0..6).boxed()
            };
            (Just(actions), Just(objects), Just(nodes), edges)
        })
        .prop_map(|(actions, objects, nodes, edges)| Model {
            actions,
            objects,
            connections: edges
                .into_iter()
                .map(|(a, b)| Connection {
                    from: nodes[a].clone(),
                    to: nodes[b].clone(),
                    label: None,
                })
                .collect(),
        })
}

fn strip_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

// ============================================================================
// Chunking
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn split_loses_no_text(text in text_strategy(), max in 1usize..80) {
        let pieces = split(&text, max);
        prop_assert_eq!(strip_whitespace(&pieces.concat()), strip_whitespace(&text));
    }

    #[test]
    fn pieces_respect_the_bound(text in text_strategy(), max in 1usize..80) {
        for piece in split(&text, max) {
            // A single word longer than the budget is kept whole.
            let single_word = !piece.contains(char::is_whitespace);
            prop_assert!(piece.chars().count() <= max || single_word);
            prop_assert_eq!(piece.trim(), piece.as_str());
        }
    }
}

// ============================================================================
// Canonicalization
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    #[test]
    fn canonical_output_is_a_fixed_point(raw in messy_model_strategy()) {
        let first = canonicalize(raw);
        prop_assert!(first.is_ok(), "canonicalize failed: {:?}", first.as_ref().err());
        let first = first.unwrap();
        let second = canonicalize(first.model.to_raw()).unwrap();
        prop_assert_eq!(&second.model, &first.model);
        prop_assert!(second.report.fixes.is_empty());
        prop_assert!(second.dangling.is_empty());
    }

    #[test]
    fn ids_are_unique_and_endpoints_resolve(raw in messy_model_strategy()) {
        let outcome = canonicalize(raw);
        prop_assert!(outcome.is_ok(), "canonicalize failed: {:?}", outcome.as_ref().err());
        let outcome = outcome.unwrap();
        let model = &outcome.model;

        let actions: HashSet<&str> = model.actions.iter().map(|a| a.id.as_str()).collect();
        prop_assert_eq!(actions.len(), model.actions.len());

        let objects: HashSet<&str> = model.objects.iter().map(|o| o.id.as_str()).collect();
        prop_assert_eq!(objects.len(), model.objects.len());

        let mut composites = HashSet::new();
        for object in &model.objects {
            prop_assert!(!object.states.is_empty());
            for state in &object.states {
                prop_assert!(composites.insert(composite(object.id.as_str(), state.id.as_str())));
            }
        }

        for connection in &model.connections {
            prop_assert!(model.contains_node(&connection.from));
            prop_assert!(model.contains_node(&connection.to));
        }
    }

    #[test]
    fn graph_round_trip_is_lossless(model in canonical_model_strategy()) {
        let graph = to_graph(&model);
        let back = canonicalize(to_model(&graph)).unwrap();
        prop_assert_eq!(back.model.sorted(), model.sorted());
        prop_assert!(back.report.fixes.is_empty());
    }
}

// ============================================================================
// Merge
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn failed_chunk_does_not_affect_others(
        chunks in prop::collection::vec(messy_model_strategy(), 1..4),
        failing in 0usize..4,
    ) {
        let all: Vec<PartialResult> = chunks
            .iter()
            .cloned()
            .enumerate()
            .map(|(i, model)| PartialResult::succeeded(i, model))
            .collect();
        let with_failure: Vec<PartialResult> = chunks
            .iter()
            .cloned()
            .enumerate()
            .map(|(i, model)| {
                if i == failing {
                    PartialResult::failed(i, "generator timed out", None)
                } else {
                    PartialResult::succeeded(i, model)
                }
            })
            .collect();
        let without: Vec<PartialResult> = all
            .iter()
            .filter(|r| r.chunk_index != failing)
            .cloned()
            .collect();

        let merged = merge(with_failure);
        let expected = merge(without);
        prop_assert_eq!(&merged.model, &expected.model);
        prop_assert_eq!(merged.failed.len(), usize::from(failing < chunks.len()));
    }
}
