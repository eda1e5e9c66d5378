//! Referential Integrity Resolver
//!
//! Every connection endpoint must name an existing action or composite
//! state. Endpoints that do not match verbatim go through:
//!
//! ```text
//!   normalizer rename (same chunk)  ─► rewritten
//!   starts with 'a'                 ─► dangling: unknown action
//!   <known object><state>           ─► existing state, or state synthesized
//!   anything else                   ─► dangling
//! ```
//!
//! Dangling connections leave the model and are returned separately so
//! they can be exported.

use crate::ids::{composite, decompose_composite, is_valid, recover_id, IdKind};
use crate::normalize::Rename;
use crate::raw::{RawConnection, RawModel, RawObject, RawState, Section};
use crate::report::{DanglingReason, Endpoint, Fix, FixKind, Issue, IssueKind};
use crate::validation::connection_loc;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DanglingEndpoint {
    pub endpoint: Endpoint,
    pub value: String,
    pub reason: DanglingReason,
}

/// A connection dropped from the canonical model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DanglingConnection {
    /// Index in the model the resolver was given.
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<usize>,
    pub connection_out: Option<String>,
    pub connection_in: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_label: Option<String>,
    pub unresolved: Vec<DanglingEndpoint>,
}

impl DanglingConnection {
    pub fn issues(&self) -> Vec<Issue> {
        self.unresolved
            .iter()
            .map(|e| {
                Issue::new(
                    IssueKind::Dangling {
                        endpoint: e.endpoint,
                        value: e.value.clone(),
                        reason: e.reason,
                    },
                    format!("{}.{}", connection_loc(self.index), e.endpoint.key()),
                )
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResolveOutcome {
    pub model: RawModel,
    pub dangling: Vec<DanglingConnection>,
    pub applied: Vec<Fix>,
}

pub fn resolve(model: &RawModel) -> ResolveOutcome {
    resolve_with_renames(model, &[])
}

struct Resolver {
    actions: HashSet<String>,
    objects: Vec<RawObject>,
    object_index: HashMap<String, usize>,
    composites: HashSet<String>,
    fixes: Vec<Fix>,
}

impl Resolver {
    fn new(model: &RawModel) -> Self {
        let actions = model
            .actions
            .items()
            .iter()
            .filter_map(|a| a.id.clone())
            .collect();
        let objects: Vec<RawObject> = model.objects.items().to_vec();
        let mut object_index = HashMap::new();
        let mut composites = HashSet::new();
        for (i, object) in objects.iter().enumerate() {
            let Some(id) = &object.id else { continue };
            object_index.entry(id.clone()).or_insert(i);
            for state in object.states.iter().flatten() {
                if let Some(state_id) = &state.id {
                    composites.insert(composite(id, state_id));
                }
            }
        }
        Self {
            actions,
            objects,
            object_index,
            composites,
            fixes: Vec::new(),
        }
    }

    fn find_object(&self, candidate: &str, known: bool) -> Option<usize> {
        if known {
            return self.object_index.get(candidate).copied();
        }
        let recovered = recover_id(IdKind::Object, candidate)?;
        self.object_index.get(&recovered).copied()
    }

    /// Resolve one endpoint. A state the endpoint needs but the object lacks
    /// comes back as pending; nothing is added until the connection is kept.
    fn endpoint(&self, value: &str) -> Result<(String, Option<PendingState>), DanglingReason> {
        if value.is_empty() {
            return Err(DanglingReason::EmptyEndpoint);
        }
        if self.actions.contains(value) || self.composites.contains(value) {
            return Ok((value.to_string(), None));
        }
        if value.starts_with('a') {
            return Err(DanglingReason::UnknownAction);
        }
        if !value.get(1..).is_some_and(|rest| rest.contains('s')) {
            return Err(DanglingReason::UnparseableReference);
        }

        let parts = decompose_composite(value, self.object_index.keys().map(String::as_str))
            .ok_or(DanglingReason::UnparseableReference)?;
        let owner = self
            .find_object(&parts.object_id, parts.known_object)
            .ok_or(DanglingReason::UnknownObject)?;
        let state_id = if is_valid(IdKind::State, &parts.state_id) {
            parts.state_id
        } else {
            recover_id(IdKind::State, &parts.state_id)
                .ok_or(DanglingReason::UnparseableReference)?
        };

        let object_id = self.objects[owner].id.clone().unwrap_or_default();
        let resolved = composite(&object_id, &state_id);
        let pending = (!self.composites.contains(&resolved)).then(|| PendingState {
            owner,
            state_id,
            composite: resolved.clone(),
        });
        Ok((resolved, pending))
    }

    fn synthesize(&mut self, pending: PendingState, location: String) {
        // Both endpoints of a self-loop may stage the same state.
        if !self.composites.insert(pending.composite.clone()) {
            return;
        }
        self.objects[pending.owner]
            .states
            .get_or_insert_with(Vec::new)
            .push(RawState {
                name: Some(format!("state {}", pending.state_id)),
                id: Some(pending.state_id),
            });
        self.fixes.push(Fix::new(
            FixKind::SynthesizedState {
                composite: pending.composite,
            },
            location,
        ));
    }
}

struct PendingState {
    owner: usize,
    state_id: String,
    composite: String,
}

/// Resolve every endpoint, applying normalizer renames first. A rename only
/// rewrites connections whose origin equals its scope.
pub fn resolve_with_renames(model: &RawModel, renames: &[Rename]) -> ResolveOutcome {
    let rename_map: HashMap<(Option<usize>, &str), &str> = renames
        .iter()
        .map(|r| ((r.scope, r.old.as_str()), r.new.as_str()))
        .collect();

    let mut resolver = Resolver::new(model);
    let mut kept = Vec::new();
    let mut dangling = Vec::new();

    for (i, connection) in model.connections.items().iter().enumerate() {
        let mut resolved = connection.clone();
        let mut unresolved = Vec::new();
        let mut staged = Vec::new();

        for endpoint in [Endpoint::Out, Endpoint::In] {
            let location = format!("{}.{}", connection_loc(i), endpoint.key());
            let original = match endpoint {
                Endpoint::Out => connection.from.clone(),
                Endpoint::In => connection.to.clone(),
            }
            .unwrap_or_default();

            let renamed = rename_map
                .get(&(connection.origin, original.as_str()))
                .map(|new| new.to_string())
                .unwrap_or_else(|| original.clone());

            match resolver.endpoint(&renamed) {
                Ok((value, pending)) => {
                    let rewrite = (value != original).then(|| {
                        Fix::new(
                            FixKind::RewroteEndpoint {
                                endpoint,
                                from: original.clone(),
                                to: value.clone(),
                            },
                            location.clone(),
                        )
                    });
                    match endpoint {
                        Endpoint::Out => resolved.from = Some(value),
                        Endpoint::In => resolved.to = Some(value),
                    }
                    staged.push((location, pending, rewrite));
                }
                Err(reason) => {
                    tracing::debug!(%location, value = %original, %reason, "dangling endpoint");
                    unresolved.push(DanglingEndpoint {
                        endpoint,
                        value: original,
                        reason,
                    });
                }
            }
        }

        if unresolved.is_empty() {
            for (location, pending, rewrite) in staged {
                if let Some(pending) = pending {
                    resolver.synthesize(pending, location);
                }
                resolver.fixes.extend(rewrite);
            }
            kept.push(resolved);
        } else {
            dangling.push(dangling_record(i, connection, unresolved));
        }
    }

    let objects = match &model.objects {
        Section::Items(_) => Section::Items(resolver.objects),
        other => other.clone(),
    };
    let connections = match &model.connections {
        Section::Items(_) => Section::Items(kept),
        other => other.clone(),
    };

    ResolveOutcome {
        model: RawModel {
            actions: model.actions.clone(),
            objects,
            connections,
        },
        dangling,
        applied: resolver.fixes,
    }
}

fn dangling_record(
    index: usize,
    connection: &RawConnection,
    unresolved: Vec<DanglingEndpoint>,
) -> DanglingConnection {
    DanglingConnection {
        index,
        chunk_index: connection.origin,
        connection_out: connection.from.clone(),
        connection_in: connection.to.clone(),
        connection_label: connection.label.clone(),
        unresolved,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base(connections: serde_json::Value) -> RawModel {
        RawModel::from_value(&json!({
            "model_actions": [{"action_id": "a00001", "action_name": "Pay"}],
            "model_objects": [
                {"object_id": "o00002", "object_name": "Order",
                 "resource_state": [{"state_id": "s00001", "state_name": "new"}]}
            ],
            "model_connections": connections
        }))
    }

    fn endpoints(model: &RawModel) -> Vec<(String, String)> {
        model
            .connections
            .items()
            .iter()
            .map(|c| (c.from.clone().unwrap(), c.to.clone().unwrap()))
            .collect()
    }

    #[test]
    fn verbatim_endpoints_pass_through() {
        let raw = base(json!([{"connection_out": "o00002s00001", "connection_in": "a00001"}]));
        let out = resolve(&raw);
        assert!(out.dangling.is_empty());
        assert!(out.applied.is_empty());
        assert_eq!(out.model, raw);
    }

    #[test]
    fn synthesizes_missing_state_on_known_object() {
        let raw = base(json!([{"connection_out": "a00001", "connection_in": "o00002s00003"}]));
        let out = resolve(&raw);
        assert!(out.dangling.is_empty());
        let states = out.model.objects.items()[0].states.clone().unwrap();
        assert_eq!(states.len(), 2);
        assert_eq!(states[1].id.as_deref(), Some("s00003"));
        assert_eq!(states[1].name.as_deref(), Some("state s00003"));
    }

    #[test]
    fn dropped_connection_synthesizes_nothing() {
        let raw = base(json!([{"connection_out": "o00002s00003", "connection_in": "a00077"}]));
        let out = resolve(&raw);
        assert_eq!(out.dangling.len(), 1);
        assert_eq!(
            out.dangling[0].unresolved[0].reason,
            DanglingReason::UnknownAction
        );
        assert!(out.model.connections.items().is_empty());
        assert_eq!(out.model.objects.items()[0].states.clone().unwrap().len(), 1);
        assert!(out.applied.is_empty());
    }

    #[test]
    fn self_loop_on_missing_state_synthesizes_it_once() {
        let raw = base(json!([{"connection_out": "o00002s00003", "connection_in": "o00002s00003"}]));
        let out = resolve(&raw);
        assert!(out.dangling.is_empty());
        let states = out.model.objects.items()[0].states.clone().unwrap();
        assert_eq!(states.len(), 2);
        let synthesized = out
            .applied
            .iter()
            .filter(|f| matches!(f.kind, FixKind::SynthesizedState { .. }))
            .count();
        assert_eq!(synthesized, 1);
    }

    #[test]
    fn recovers_malformed_state_part() {
        let raw = base(json!([{"connection_out": "a00001", "connection_in": "o00002s3"}]));
        let out = resolve(&raw);
        assert_eq!(
            endpoints(&out.model),
            vec![("a00001".to_string(), "o00002s00003".to_string())]
        );
        assert!(out
            .applied
            .iter()
            .any(|f| matches!(&f.kind, FixKind::RewroteEndpoint { to, .. } if to == "o00002s00003")));
    }

    #[test]
    fn unknown_references_dangle() {
        let raw = base(json!([
            {"connection_out": "a00009", "connection_in": "o00002s00001"},
            {"connection_out": "a00001", "connection_in": "o00005s00001"},
            {"connection_out": "a00001", "connection_in": "Order"},
            {"connection_out": "o00002s00001", "connection_in": "a00001"}
        ]));
        let out = resolve(&raw);
        assert_eq!(out.model.connections.items().len(), 1);
        let reasons: Vec<DanglingReason> = out
            .dangling
            .iter()
            .map(|d| d.unresolved[0].reason)
            .collect();
        assert_eq!(
            reasons,
            vec![
                DanglingReason::UnknownAction,
                DanglingReason::UnknownObject,
                DanglingReason::UnparseableReference
            ]
        );
        assert_eq!(out.dangling[1].index, 1);
        assert_eq!(
            out.dangling[0].issues()[0].location,
            "model_connections[0].connection_out"
        );
    }

    #[test]
    fn empty_endpoint_dangles() {
        let raw = base(json!([{"connection_out": "", "connection_in": "a00001"}]));
        let out = resolve(&raw);
        assert_eq!(out.dangling.len(), 1);
        assert_eq!(
            out.dangling[0].unresolved[0].reason,
            DanglingReason::EmptyEndpoint
        );
    }

    #[test]
    fn renames_apply_only_in_scope() {
        let mut raw = base(json!([
            {"connection_out": "a7", "connection_in": "o00002s00001"},
            {"connection_out": "a7", "connection_in": "o00002s00001"}
        ]));
        if let Section::Items(connections) = &mut raw.connections {
            connections[0].origin = Some(1);
            connections[1].origin = Some(2);
        }
        let renames = vec![Rename {
            scope: Some(1),
            old: "a7".into(),
            new: "a00001".into(),
        }];
        let out = resolve_with_renames(&raw, &renames);
        assert_eq!(out.model.connections.items().len(), 1);
        assert_eq!(out.dangling.len(), 1);
        assert_eq!(out.dangling[0].chunk_index, Some(2));
    }
}
