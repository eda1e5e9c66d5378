//! Cycle detection over the connection graph.
//!
//! Cycles are legitimate in process models (retry loops, re-login), so they
//! are reported as warnings and never rejected.

use crate::ids::NodeRef;
use crate::model::Model;
use std::collections::{HashMap, HashSet};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnStack,
    Done,
}

/// Every distinct cycle, each as the node sequence starting at the node
/// where the back edge closed it. Rotations of a reported cycle are not
/// reported again. Traversal follows first-appearance order in
/// `connections`, so the output is deterministic.
pub fn find_cycles(model: &Model) -> Vec<Vec<NodeRef>> {
    let mut nodes: Vec<&NodeRef> = Vec::new();
    let mut index: HashMap<&NodeRef, usize> = HashMap::new();
    let mut adjacency: Vec<Vec<usize>> = Vec::new();
    for connection in &model.connections {
        for node in [&connection.from, &connection.to] {
            if !index.contains_key(node) {
                index.insert(node, nodes.len());
                nodes.push(node);
                adjacency.push(Vec::new());
            }
        }
        let from = index[&connection.from];
        let to = index[&connection.to];
        if !adjacency[from].contains(&to) {
            adjacency[from].push(to);
        }
    }

    let mut marks = vec![Mark::Unvisited; nodes.len()];
    let mut seen: HashSet<Vec<usize>> = HashSet::new();
    let mut cycles = Vec::new();

    for start in 0..nodes.len() {
        if marks[start] != Mark::Unvisited {
            continue;
        }
        // (node, next neighbour to visit); doubles as the recursion stack.
        let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
        marks[start] = Mark::OnStack;

        while let Some(frame) = stack.last_mut() {
            let node = frame.0;
            let Some(&neighbour) = adjacency[node].get(frame.1) else {
                marks[node] = Mark::Done;
                stack.pop();
                continue;
            };
            frame.1 += 1;
            match marks[neighbour] {
                Mark::Unvisited => {
                    marks[neighbour] = Mark::OnStack;
                    stack.push((neighbour, 0));
                }
                Mark::OnStack => {
                    let from = stack
                        .iter()
                        .position(|&(n, _)| n == neighbour)
                        .unwrap_or(0);
                    let cycle: Vec<usize> = stack[from..].iter().map(|&(n, _)| n).collect();
                    if seen.insert(canonical_rotation(&cycle)) {
                        cycles.push(cycle.iter().map(|&n| nodes[n].clone()).collect());
                    }
                }
                Mark::Done => {}
            }
        }
    }

    cycles
}

/// Rotation starting at the smallest node index.
fn canonical_rotation(cycle: &[usize]) -> Vec<usize> {
    let pivot = cycle
        .iter()
        .enumerate()
        .min_by_key(|&(_, n)| *n)
        .map(|(i, _)| i)
        .unwrap_or(0);
    cycle[pivot..]
        .iter()
        .chain(cycle[..pivot].iter())
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Connection;

    fn model(edges: &[(&str, &str)]) -> Model {
        Model {
            connections: edges
                .iter()
                .map(|(from, to)| Connection {
                    from: NodeRef::parse(from).unwrap(),
                    to: NodeRef::parse(to).unwrap(),
                    label: None,
                })
                .collect(),
            ..Model::default()
        }
    }

    fn names(cycles: &[Vec<NodeRef>]) -> Vec<Vec<String>> {
        cycles
            .iter()
            .map(|c| c.iter().map(|n| n.to_string()).collect())
            .collect()
    }

    #[test]
    fn acyclic_graph_has_no_cycles() {
        let m = model(&[("o00001s00001", "a00001"), ("a00001", "o00001s00002")]);
        assert!(find_cycles(&m).is_empty());
    }

    #[test]
    fn two_cycle_reported_once() {
        let m = model(&[("a00001", "o00001s00001"), ("o00001s00001", "a00001")]);
        assert_eq!(
            names(&find_cycles(&m)),
            vec![vec!["a00001".to_string(), "o00001s00001".to_string()]]
        );
    }

    #[test]
    fn self_loop_is_length_one() {
        let m = model(&[("a00001", "a00001")]);
        assert!(m.connections[0].is_self_loop());
        assert_eq!(names(&find_cycles(&m)), vec![vec!["a00001".to_string()]]);
    }

    #[test]
    fn parallel_edges_do_not_duplicate_cycles() {
        let m = model(&[
            ("a00001", "o00001s00001"),
            ("a00001", "o00001s00001"),
            ("o00001s00001", "a00001"),
        ]);
        assert_eq!(find_cycles(&m).len(), 1);
    }

    #[test]
    fn finds_independent_cycles() {
        let m = model(&[
            ("a00001", "o00001s00001"),
            ("o00001s00001", "a00001"),
            ("o00001s00001", "a00002"),
            ("a00002", "o00002s00001"),
            ("o00002s00001", "a00002"),
        ]);
        assert_eq!(find_cycles(&m).len(), 2);
    }
}
