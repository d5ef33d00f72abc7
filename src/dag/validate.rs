// src/dag/validate.rs

use std::collections::HashSet;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::dag::graph::TaskGraph;
use crate::errors::{DagatherError, Result};
use crate::registry::Registry;
use crate::types::TaskName;

/// Validate a registry snapshot and produce the immutable execution graph.
///
/// This checks, in order:
/// - every declared dependency refers to a registered task
/// - no task depends on itself
/// - the dependency graph has no cycles
///
/// Any violation fails the invocation before a single task runs.
pub fn build_graph(registry: &Registry) -> Result<TaskGraph> {
    ensure_known_dependencies(registry)?;
    ensure_acyclic(registry)?;
    Ok(TaskGraph::from_validated(registry))
}

fn ensure_known_dependencies(registry: &Registry) -> Result<()> {
    for spec in registry.iter() {
        for dep in spec.deps.iter() {
            if !registry.contains(dep) {
                return Err(DagatherError::UnknownDependency {
                    task: spec.name.clone(),
                    missing: dep.clone(),
                });
            }
        }
    }
    Ok(())
}

fn ensure_acyclic(registry: &Registry) -> Result<()> {
    // A self-dependency is the degenerate cycle; report it directly rather
    // than routing it through the graph walk.
    for spec in registry.iter() {
        if spec.deps.iter().any(|dep| dep == &spec.name) {
            return Err(DagatherError::Cycle {
                path: vec![spec.name.clone(), spec.name.clone()],
            });
        }
    }

    // Edge direction: dep -> task, matching execution order.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in registry.names() {
        graph.add_node(name);
    }
    for spec in registry.iter() {
        for dep in spec.deps.iter() {
            graph.add_edge(dep.as_str(), spec.name.as_str(), ());
        }
    }

    // A topological sort will fail if there is a cycle.
    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => {
            let start = cycle.node_id();
            Err(DagatherError::Cycle {
                path: find_cycle_path(&graph, start),
            })
        }
    }
}

/// Recover the full cycle path for diagnostics.
///
/// Depth-first traversal from `start` over successor edges, tracking the
/// path on the stack; the first walk back into `start` closes the cycle.
/// The returned path repeats the starting node at the end.
fn find_cycle_path<'a>(graph: &DiGraphMap<&'a str, ()>, start: &'a str) -> Vec<TaskName> {
    let mut stack: Vec<(&str, Vec<&str>)> = vec![(start, vec![start])];
    let mut visited: HashSet<&str> = HashSet::from([start]);

    while let Some((node, path)) = stack.pop() {
        for next in graph.neighbors(node) {
            if next == start {
                let mut full: Vec<TaskName> = path.iter().map(|s| s.to_string()).collect();
                full.push(start.to_string());
                return full;
            }
            if visited.insert(next) {
                let mut next_path = path.clone();
                next_path.push(next);
                stack.push((next, next_path));
            }
        }
    }

    // `toposort` reported a cycle through `start`; not closing it would mean
    // the graph changed underneath us, which cannot happen here.
    vec![start.to_string(), start.to_string()]
}
