//! Structural Validator
//!
//! Read-only pass over a [`RawModel`]. Checks run in a fixed order:
//!
//! ```text
//!   1. section shape          (fatal)
//!   2. action ids             missing / malformed
//!   3. object + state ids     missing / malformed
//!   4. uniqueness             actions, objects, states per object, composites
//!   5. connection endpoints   present and non-empty
//!   then advisory warnings    names, empty objects/sections, state -> state
//! ```

use crate::ids::{composite, is_valid, IdKind};
use crate::model::ModelSection;
use crate::raw::{RawModel, Section};
use crate::report::{Endpoint, Issue, IssueKind, ValidationReport};
use std::collections::{BTreeMap, HashMap};

pub(crate) fn action_loc(i: usize) -> String {
    format!("model_actions[{i}]")
}

pub(crate) fn object_loc(i: usize) -> String {
    format!("model_objects[{i}]")
}

pub(crate) fn state_loc(i: usize, j: usize) -> String {
    format!("model_objects[{i}].resource_state[{j}]")
}

pub(crate) fn connection_loc(i: usize) -> String {
    format!("model_connections[{i}]")
}

fn check_id(
    report: &mut ValidationReport,
    kind: IdKind,
    value: &Option<String>,
    location: String,
) {
    match value {
        None => report.push(Issue::new(IssueKind::MissingId { entity: kind }, location)),
        Some(v) if !is_valid(kind, v) => report.push(Issue::new(
            IssueKind::MalformedId {
                entity: kind,
                value: v.clone(),
            },
            location,
        )),
        Some(_) => {}
    }
}

/// Report every occurrence of every value that appears more than once.
/// `entries` are `(value, location)` in model order.
fn report_duplicates(
    report: &mut ValidationReport,
    entries: Vec<(String, String)>,
    make: impl Fn(&str) -> IssueKind,
) {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for (value, _) in &entries {
        *counts.entry(value.as_str()).or_default() += 1;
    }
    for (value, location) in &entries {
        if counts.get(value.as_str()).copied().unwrap_or(0) > 1 {
            report.push(Issue::new(make(value), location.clone()));
        }
    }
}

fn check_shape<T>(report: &mut ValidationReport, section: &Section<T>, which: ModelSection) {
    match section {
        Section::Missing => report.push(Issue::new(
            IssueKind::MissingSection { section: which },
            which.key(),
        )),
        Section::NotAnArray(found) => report.push(Issue::new(
            IssueKind::SectionNotArray {
                section: which,
                found: *found,
            },
            which.key(),
        )),
        Section::Items(items) if items.is_empty() => report.push(Issue::new(
            IssueKind::EmptySection { section: which },
            which.key(),
        )),
        Section::Items(_) => {}
    }
}

/// Validate without mutating. Broken sections are reported and skipped.
pub fn validate(model: &RawModel) -> ValidationReport {
    let mut report = ValidationReport::default();

    check_shape(&mut report, &model.actions, ModelSection::Actions);
    check_shape(&mut report, &model.objects, ModelSection::Objects);
    check_shape(&mut report, &model.connections, ModelSection::Connections);

    let actions = model.actions.items();
    let objects = model.objects.items();
    let connections = model.connections.items();

    for (i, action) in actions.iter().enumerate() {
        check_id(&mut report, IdKind::Action, &action.id, action_loc(i));
    }

    for (i, object) in objects.iter().enumerate() {
        check_id(&mut report, IdKind::Object, &object.id, object_loc(i));
        for (j, state) in object.states.iter().flatten().enumerate() {
            check_id(&mut report, IdKind::State, &state.id, state_loc(i, j));
        }
    }

    // Uniqueness
    let action_ids = actions
        .iter()
        .enumerate()
        .filter_map(|(i, a)| a.id.clone().map(|id| (id, action_loc(i))))
        .collect();
    report_duplicates(&mut report, action_ids, |v| IssueKind::DuplicateId {
        entity: IdKind::Action,
        value: v.to_string(),
    });

    let object_ids = objects
        .iter()
        .enumerate()
        .filter_map(|(i, o)| o.id.clone().map(|id| (id, object_loc(i))))
        .collect();
    report_duplicates(&mut report, object_ids, |v| IssueKind::DuplicateId {
        entity: IdKind::Object,
        value: v.to_string(),
    });

    for (i, object) in objects.iter().enumerate() {
        let state_ids = object
            .states
            .iter()
            .flatten()
            .enumerate()
            .filter_map(|(j, s)| s.id.clone().map(|id| (id, state_loc(i, j))))
            .collect();
        report_duplicates(&mut report, state_ids, |v| IssueKind::DuplicateId {
            entity: IdKind::State,
            value: v.to_string(),
        });
    }

    // Composite collisions across different objects only; duplicates inside
    // one object were reported above.
    let mut composites: BTreeMap<String, Vec<(usize, usize)>> = BTreeMap::new();
    for (i, object) in objects.iter().enumerate() {
        let Some(object_id) = &object.id else { continue };
        for (j, state) in object.states.iter().flatten().enumerate() {
            if let Some(state_id) = &state.id {
                composites
                    .entry(composite(object_id, state_id))
                    .or_default()
                    .push((i, j));
            }
        }
    }
    let mut composite_dups: Vec<(usize, usize, String)> = Vec::new();
    for (value, seen) in composites {
        if seen.iter().any(|(object, _)| *object != seen[0].0) {
            composite_dups.extend(seen.into_iter().map(|(i, j)| (i, j, value.clone())));
        }
    }
    composite_dups.sort();
    for (i, j, value) in composite_dups {
        report.push(Issue::new(
            IssueKind::DuplicateComposite { value },
            state_loc(i, j),
        ));
    }

    for (i, connection) in connections.iter().enumerate() {
        for (endpoint, value) in [(Endpoint::Out, &connection.from), (Endpoint::In, &connection.to)] {
            if value.as_deref().map_or(true, str::is_empty) {
                report.push(Issue::new(
                    IssueKind::EmptyEndpoint { endpoint },
                    format!("{}.{}", connection_loc(i), endpoint.key()),
                ));
            }
        }
    }

    // Advisory warnings
    for (i, action) in actions.iter().enumerate() {
        if action.name.as_deref().map_or(true, |n| n.trim().is_empty()) {
            report.push(Issue::new(
                IssueKind::MissingName {
                    entity: IdKind::Action,
                },
                action_loc(i),
            ));
        }
    }

    for (i, object) in objects.iter().enumerate() {
        if object.name.as_deref().map_or(true, |n| n.trim().is_empty()) {
            report.push(Issue::new(
                IssueKind::MissingName {
                    entity: IdKind::Object,
                },
                object_loc(i),
            ));
        }
        let states = object.states.as_deref().unwrap_or_default();
        if states.is_empty() {
            report.push(Issue::new(IssueKind::NoStates, object_loc(i)));
        }
        let mut names: HashMap<&str, usize> = HashMap::new();
        for (j, state) in states.iter().enumerate() {
            match state.name.as_deref().map(str::trim) {
                None | Some("") => report.push(Issue::new(
                    IssueKind::MissingName {
                        entity: IdKind::State,
                    },
                    state_loc(i, j),
                )),
                Some(name) => {
                    let count = names.entry(name).or_default();
                    *count += 1;
                    if *count == 2 {
                        report.push(Issue::new(
                            IssueKind::DuplicateStateName {
                                name: name.to_string(),
                            },
                            object_loc(i),
                        ));
                    }
                }
            }
        }
    }

    for (i, connection) in connections.iter().enumerate() {
        if let (Some(from), Some(to)) = (&connection.from, &connection.to) {
            if !from.is_empty() && !to.is_empty() && !from.starts_with('a') && !to.starts_with('a')
            {
                report.push(Issue::new(IssueKind::StateToState, connection_loc(i)));
            }
        }
    }

    report
}
