// src/dag/graph.rs

use std::collections::HashMap;

use crate::registry::Registry;
use crate::types::TaskName;

/// Internal node structure: stores immediate deps and dependents.
#[derive(Debug, Clone)]
struct GraphNode {
    /// Direct dependencies: tasks that must complete before this one runs.
    deps: Vec<TaskName>,
    /// Direct dependents: tasks that depend on this one.
    dependents: Vec<TaskName>,
}

/// Immutable adjacency view over a registry snapshot, keyed by task name.
///
/// Built through [`validate::build_graph`](crate::dag::validate::build_graph),
/// which has already checked that every dependency resolves and that there
/// are no cycles; here we just keep adjacency information for scheduling and
/// diagnostics. Rebuilt fresh on every invocation.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    nodes: HashMap<TaskName, GraphNode>,
}

impl TaskGraph {
    /// Build adjacency from a registry whose references are known to resolve.
    pub(crate) fn from_validated(registry: &Registry) -> Self {
        let mut nodes: HashMap<TaskName, GraphNode> = HashMap::new();

        // First pass: create nodes with their dependency lists.
        for spec in registry.iter() {
            nodes.insert(
                spec.name.clone(),
                GraphNode {
                    deps: spec.deps.clone(),
                    dependents: Vec::new(),
                },
            );
        }

        // Second pass: populate dependents based on deps.
        let names: Vec<TaskName> = nodes.keys().cloned().collect();
        for name in names {
            // clone to avoid borrowing issues while mutating
            let deps = nodes
                .get(&name)
                .map(|n| n.deps.clone())
                .unwrap_or_default();

            for dep in deps {
                if let Some(dep_node) = nodes.get_mut(&dep) {
                    dep_node.dependents.push(name.clone());
                }
            }
        }

        Self { nodes }
    }

    /// Number of tasks in the graph.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Return all task names.
    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(|s| s.as_str())
    }

    /// Immediate dependencies of a task.
    pub fn dependencies_of(&self, name: &str) -> &[TaskName] {
        self.nodes
            .get(name)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents of a task.
    pub fn dependents_of(&self, name: &str) -> &[TaskName] {
        self.nodes
            .get(name)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    /// Tasks with no dependencies; the seeds of a run.
    pub fn roots(&self) -> impl Iterator<Item = &str> {
        self.nodes
            .iter()
            .filter(|(_, node)| node.deps.is_empty())
            .map(|(name, _)| name.as_str())
    }
}
