//! Dependency-graph checks for the task table.
//!
//! Creation-time cycle detection keeps the graph schedulable; a cycle of
//! finish-to-start edges would otherwise deadlock silently.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

fn visit(
    node: Uuid,
    edges: &HashMap<Uuid, Vec<Uuid>>,
    visited: &mut HashSet<Uuid>,
    rec_stack: &mut HashSet<Uuid>,
    path: &mut Vec<Uuid>,
) -> bool {
    visited.insert(node);
    rec_stack.insert(node);
    path.push(node);

    if let Some(neighbors) = edges.get(&node) {
        for &neighbor in neighbors {
            if !visited.contains(&neighbor) {
                if visit(neighbor, edges, visited, rec_stack, path) {
                    return true;
                }
            } else if rec_stack.contains(&neighbor) {
                if let Some(cycle_start) = path.iter().position(|&id| id == neighbor) {
                    path.drain(0..cycle_start);
                    return true;
                }
            }
        }
    }

    rec_stack.remove(&node);
    path.pop();
    false
}

/// Find a dependency cycle in an adjacency list, if any.
///
/// Returns the cycle path (first node repeated implicitly) or `None`.
pub fn find_cycle(edges: &HashMap<Uuid, Vec<Uuid>>) -> Option<Vec<Uuid>> {
    let mut visited = HashSet::new();
    let mut rec_stack = HashSet::new();
    let mut path = Vec::new();

    for &node in edges.keys() {
        if !visited.contains(&node) && visit(node, edges, &mut visited, &mut rec_stack, &mut path) {
            return Some(path);
        }
    }
    None
}
