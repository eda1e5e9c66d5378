//! Self-Healing Normalizer
//!
//! One pass applies every rule in a fixed order, per entity list:
//!
//! ```text
//!   recover malformed ids  ──►  rename duplicates  ──►  synthesize missing ids
//!                                        │
//!   (objects, then states per object)    ▼
//!                         null states ──► default names and links
//! ```
//!
//! Duplicate renaming runs after recovery, so a recovered id that collides
//! with an existing one is fixed in the same pass. Each rule only rebuilds
//! values; the input model is never touched.

use crate::ids::{composite, is_valid, recover_id, IdAllocator, IdError, IdKind};
use crate::ids::{NULL_STATE_ID, NULL_STATE_NAME};
use crate::model::Links;
use crate::raw::{RawModel, RawObject, RawState, Section};
use crate::report::{Fix, FixKind, ValidationReport};
use crate::validation::{action_loc, object_loc, state_loc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// An id that changed during normalization, as seen by connections of the
/// chunk `scope`. The resolver rewrites matching endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Rename {
    pub scope: Option<usize>,
    pub old: String,
    pub new: String,
}

#[derive(Debug, Clone, Default)]
pub struct NormalizeOutcome {
    pub model: RawModel,
    pub applied: Vec<Fix>,
    pub renames: Vec<Rename>,
}

/// Final id of one entity plus every spelling it was known by.
struct Assigned {
    id: String,
    spellings: Vec<String>,
}

fn assign_ids(
    kind: IdKind,
    raw_ids: &[Option<String>],
    location: impl Fn(usize) -> String,
    fixes: &mut Vec<Fix>,
) -> Result<Vec<Assigned>, IdError> {
    let mut resolved: Vec<Option<String>> = Vec::with_capacity(raw_ids.len());
    let mut spellings: Vec<Vec<String>> = Vec::with_capacity(raw_ids.len());

    for (i, raw) in raw_ids.iter().enumerate() {
        let mut known = Vec::new();
        let id = match raw {
            None => None,
            Some(value) if is_valid(kind, value) => {
                known.push(value.clone());
                Some(value.clone())
            }
            Some(value) => {
                known.push(value.clone());
                let recovered = recover_id(kind, value);
                if let Some(to) = &recovered {
                    fixes.push(Fix::new(
                        FixKind::RecoveredId {
                            entity: kind,
                            from: value.clone(),
                            to: to.clone(),
                        },
                        location(i),
                    ));
                    known.push(to.clone());
                }
                recovered
            }
        };
        resolved.push(id);
        spellings.push(known);
    }

    let mut allocator = IdAllocator::seeded(kind, resolved.iter().flatten().map(String::as_str));

    let mut seen: HashSet<String> = HashSet::new();
    for (i, slot) in resolved.iter_mut().enumerate() {
        let Some(id) = slot.as_ref() else { continue };
        if seen.insert(id.clone()) {
            continue;
        }
        let fresh = allocator.next_id()?;
        fixes.push(Fix::new(
            FixKind::RenamedDuplicate {
                entity: kind,
                from: id.clone(),
                to: fresh.clone(),
            },
            location(i),
        ));
        seen.insert(fresh.clone());
        *slot = Some(fresh);
    }

    let mut assigned = Vec::with_capacity(resolved.len());
    for (i, (slot, known)) in resolved.into_iter().zip(spellings).enumerate() {
        let id = match slot {
            Some(id) => id,
            None => {
                let fresh = allocator.claim(i as u32 + 1)?;
                fixes.push(Fix::new(
                    FixKind::SynthesizedId {
                        entity: kind,
                        id: fresh.clone(),
                    },
                    location(i),
                ));
                fresh
            }
        };
        assigned.push(Assigned {
            id,
            spellings: known,
        });
    }
    Ok(assigned)
}

fn name_or_default(
    name: &Option<String>,
    kind: IdKind,
    id: &str,
    location: String,
    fixes: &mut Vec<Fix>,
) -> String {
    match name {
        Some(n) if !n.trim().is_empty() => n.clone(),
        _ => {
            let fallback = format!("{} {}", kind.label(), id);
            fixes.push(Fix::new(
                FixKind::DefaultedName {
                    entity: kind,
                    name: fallback.clone(),
                },
                location,
            ));
            fallback
        }
    }
}

/// `(scope, spelling) -> final id` for spellings that identify exactly one
/// entity within their scope. Ambiguous spellings are left alone: rewriting
/// them would silently move edges between entities.
#[derive(Default)]
struct RenameIndex {
    entries: Vec<(Option<usize>, String, String)>,
}

impl RenameIndex {
    fn add(&mut self, scope: Option<usize>, spellings: &[String], id: &str) {
        for spelling in spellings {
            self.entries.push((scope, spelling.clone(), id.to_string()));
        }
    }

    fn into_renames(self) -> Vec<Rename> {
        let mut counts: HashMap<(Option<usize>, &str), usize> = HashMap::new();
        for (scope, spelling, _) in &self.entries {
            *counts.entry((*scope, spelling.as_str())).or_default() += 1;
        }
        let mut renames = Vec::new();
        let mut emitted = HashSet::new();
        for (scope, old, new) in &self.entries {
            if old == new || counts.get(&(*scope, old.as_str())).copied() != Some(1) {
                continue;
            }
            let rename = Rename {
                scope: *scope,
                old: old.clone(),
                new: new.clone(),
            };
            if emitted.insert(rename.clone()) {
                renames.push(rename);
            }
        }
        renames
    }
}

/// Apply every repair rule once. When `issues` holds nothing repairable the
/// model comes back unchanged with no fixes.
pub fn normalize(
    model: &RawModel,
    issues: &ValidationReport,
) -> Result<NormalizeOutcome, IdError> {
    if !issues.has_repairable() {
        return Ok(NormalizeOutcome {
            model: model.clone(),
            ..NormalizeOutcome::default()
        });
    }

    let mut fixes = Vec::new();
    let mut index = RenameIndex::default();

    let actions = match &model.actions {
        Section::Items(actions) => {
            let raw_ids: Vec<Option<String>> = actions.iter().map(|a| a.id.clone()).collect();
            let assigned = assign_ids(IdKind::Action, &raw_ids, action_loc, &mut fixes)?;
            let mut rebuilt = Vec::with_capacity(actions.len());
            for (i, (action, assigned)) in actions.iter().zip(assigned).enumerate() {
                index.add(action.origin, &assigned.spellings, &assigned.id);
                let mut action = action.clone();
                action.name = Some(name_or_default(
                    &action.name,
                    IdKind::Action,
                    &assigned.id,
                    action_loc(i),
                    &mut fixes,
                ));
                action.links = Some(action.links.unwrap_or_default());
                action.id = Some(assigned.id);
                rebuilt.push(action);
            }
            Section::Items(rebuilt)
        }
        other => other.clone(),
    };

    let objects = match &model.objects {
        Section::Items(objects) => {
            let raw_ids: Vec<Option<String>> = objects.iter().map(|o| o.id.clone()).collect();
            let assigned = assign_ids(IdKind::Object, &raw_ids, object_loc, &mut fixes)?;
            let mut rebuilt = Vec::with_capacity(objects.len());
            for (i, (object, assigned)) in objects.iter().zip(assigned).enumerate() {
                rebuilt.push(normalize_object(i, object, assigned, &mut index, &mut fixes)?);
            }
            Section::Items(rebuilt)
        }
        other => other.clone(),
    };

    let renames = index.into_renames();
    tracing::debug!(
        fixes = fixes.len(),
        renames = renames.len(),
        "normalization pass applied"
    );

    Ok(NormalizeOutcome {
        model: RawModel {
            actions,
            objects,
            connections: model.connections.clone(),
        },
        applied: fixes,
        renames,
    })
}

fn normalize_object(
    i: usize,
    object: &RawObject,
    assigned: Assigned,
    index: &mut RenameIndex,
    fixes: &mut Vec<Fix>,
) -> Result<RawObject, IdError> {
    let raw_states = object.states.as_deref().unwrap_or_default();
    let raw_ids: Vec<Option<String>> = raw_states.iter().map(|s| s.id.clone()).collect();
    let state_ids = assign_ids(IdKind::State, &raw_ids, |j| state_loc(i, j), fixes)?;

    let mut states = Vec::with_capacity(raw_states.len().max(1));
    for (j, (state, state_id)) in raw_states.iter().zip(state_ids).enumerate() {
        let composite_spellings: Vec<String> = assigned
            .spellings
            .iter()
            .flat_map(|o| state_id.spellings.iter().map(move |s| composite(o, s)))
            .collect();
        index.add(
            object.origin,
            &composite_spellings,
            &composite(&assigned.id, &state_id.id),
        );
        let name = name_or_default(&state.name, IdKind::State, &state_id.id, state_loc(i, j), fixes);
        states.push(RawState {
            id: Some(state_id.id),
            name: Some(name),
        });
    }

    if states.is_empty() {
        fixes.push(Fix::new(
            FixKind::InsertedNullState {
                object: assigned.id.clone(),
            },
            object_loc(i),
        ));
        states.push(RawState {
            id: Some(NULL_STATE_ID.to_string()),
            name: Some(NULL_STATE_NAME.to_string()),
        });
    }

    let name = name_or_default(&object.name, IdKind::Object, &assigned.id, object_loc(i), fixes);
    Ok(RawObject {
        id: Some(assigned.id),
        name: Some(name),
        states: Some(states),
        links: Some(object.links.clone().unwrap_or_else(Links::default)),
        origin: object.origin,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::validate;
    use serde_json::json;

    fn run(value: serde_json::Value) -> NormalizeOutcome {
        let raw = RawModel::from_value(&value);
        let report = validate(&raw);
        normalize(&raw, &report).unwrap()
    }

    fn action_ids(model: &RawModel) -> Vec<String> {
        model
            .actions
            .items()
            .iter()
            .map(|a| a.id.clone().unwrap())
            .collect()
    }

    #[test]
    fn synthesizes_positional_ids() {
        let out = run(json!({
            "model_actions": [{"action_name": "a"}, {"action_name": "b"}],
            "model_objects": [],
            "model_connections": []
        }));
        assert_eq!(action_ids(&out.model), vec!["a00001", "a00002"]);
        assert!(out.renames.is_empty());
    }

    #[test]
    fn synthesis_skips_taken_positions() {
        let out = run(json!({
            "model_actions": [{"action_id": "a00004", "action_name": "a"}, {"action_name": "b"}],
            "model_objects": [],
            "model_connections": []
        }));
        // Position 2 is free.
        assert_eq!(action_ids(&out.model), vec!["a00004", "a00002"]);

        let out = run(json!({
            "model_actions": [{"action_name": "b"}, {"action_id": "a00001", "action_name": "a"}],
            "model_objects": [],
            "model_connections": []
        }));
        // Position 1 is taken; continue after the highest.
        assert_eq!(action_ids(&out.model), vec!["a00002", "a00001"]);
    }

    #[test]
    fn recovers_and_records_rename() {
        let out = run(json!({
            "model_actions": [{"action_id": "a7", "action_name": "go"}],
            "model_objects": [],
            "model_connections": []
        }));
        assert_eq!(action_ids(&out.model), vec!["a00007"]);
        assert_eq!(
            out.renames,
            vec![Rename {
                scope: None,
                old: "a7".into(),
                new: "a00007".into()
            }]
        );
    }

    #[test]
    fn recovered_collision_is_renamed_in_same_pass() {
        let out = run(json!({
            "model_actions": [
                {"action_id": "a00007", "action_name": "x"},
                {"action_id": "a7", "action_name": "y"}
            ],
            "model_objects": [],
            "model_connections": []
        }));
        assert_eq!(action_ids(&out.model), vec!["a00007", "a00008"]);
        assert!(validate(&out.model).errors.is_empty());
    }

    #[test]
    fn unscoped_duplicates_produce_no_rename() {
        let out = run(json!({
            "model_actions": [
                {"action_id": "a00001", "action_name": "x"},
                {"action_id": "a00001", "action_name": "y"}
            ],
            "model_objects": [],
            "model_connections": []
        }));
        assert_eq!(action_ids(&out.model), vec!["a00001", "a00002"]);
        assert!(out.renames.is_empty());
        assert!(out
            .applied
            .iter()
            .any(|f| matches!(f.kind, FixKind::RenamedDuplicate { .. })));
    }

    #[test]
    fn scoped_duplicates_rename_composites() {
        let first = RawModel::from_value(&json!({
            "model_actions": [],
            "model_objects": [{"object_id": "o00001", "object_name": "User",
                "resource_state": [{"state_id": "s00001", "state_name": "new"}]}],
            "model_connections": []
        }))
        .with_origin(0);
        let second = RawModel::from_value(&json!({
            "model_actions": [],
            "model_objects": [{"object_id": "o00001", "object_name": "Order",
                "resource_state": [{"state_id": "s00001", "state_name": "paid"}]}],
            "model_connections": []
        }))
        .with_origin(1);
        let mut objects = first.objects.items().to_vec();
        objects.extend(second.objects.items().iter().cloned());
        let raw = RawModel {
            objects: Section::Items(objects),
            ..RawModel::default()
        };
        let out = normalize(&raw, &validate(&raw)).unwrap();
        // Connections only reference composites, so only those are renamed.
        assert_eq!(
            out.renames,
            vec![Rename {
                scope: Some(1),
                old: "o00001s00001".into(),
                new: "o00002s00001".into()
            }]
        );
    }

    #[test]
    fn inserts_null_state_and_default_names() {
        let out = run(json!({
            "model_actions": [{"action_id": "a00001"}],
            "model_objects": [{"object_id": "o00001", "object_name": "Cart"}],
            "model_connections": []
        }));
        let action = &out.model.actions.items()[0];
        assert_eq!(action.name.as_deref(), Some("action a00001"));
        assert_eq!(action.links, Some(Links::default()));
        let states = out.model.objects.items()[0].states.clone().unwrap();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].id.as_deref(), Some(NULL_STATE_ID));
        assert_eq!(states[0].name.as_deref(), Some(NULL_STATE_NAME));
    }

    #[test]
    fn nothing_repairable_returns_model_unchanged() {
        let raw = RawModel::from_value(&json!({
            "model_actions": [{"action_id": "a00001", "action_name": "x"}],
            "model_objects": [],
            "model_connections": [{"connection_out": "", "connection_in": "a00001"}]
        }));
        let out = normalize(&raw, &validate(&raw)).unwrap();
        assert_eq!(out.model, raw);
        assert!(out.applied.is_empty());
    }

    #[test]
    fn second_pass_is_a_no_op() {
        let out = run(json!({
            "model_actions": [{"action_id": "x"}, {"action_id": "a2"}, {"action_id": "a2"}],
            "model_objects": [{"object_name": "O", "resource_state": [{"state_id": "s1"}, {}]}],
            "model_connections": []
        }));
        let again = normalize(&out.model, &validate(&out.model)).unwrap();
        assert!(again.applied.is_empty());
        assert_eq!(again.model, out.model);
    }
}
