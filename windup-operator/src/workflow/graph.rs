//! Dependency graph of resource nodes.

use super::node::{NodeId, ResourceNode};
use crate::error::{OperatorError, OperatorResult};
use std::collections::{HashMap, HashSet, VecDeque};

/// A validated, acyclic set of resource nodes.
///
/// Built once at startup. Nodes are kept in a deterministic topological
/// order: among nodes whose dependencies are met, declaration order wins.
#[derive(Debug)]
pub struct DependencyGraph {
    /// Nodes in topological order.
    nodes: Vec<ResourceNode>,
    /// Position of each node in `nodes`.
    index: HashMap<NodeId, usize>,
    /// Direct dependents of each node.
    dependents: HashMap<NodeId, Vec<NodeId>>,
}

impl DependencyGraph {
    /// Validate `nodes` and sort them.
    ///
    /// Duplicate ids, references to unknown nodes and cycles are rejected.
    pub fn new(nodes: Vec<ResourceNode>) -> OperatorResult<Self> {
        let mut seen = HashSet::new();
        for node in &nodes {
            if !seen.insert(node.id) {
                return Err(OperatorError::InvalidWorkflow(format!(
                    "duplicate node id '{}'",
                    node.id
                )));
            }
        }

        for node in &nodes {
            for dep in &node.depends_on {
                if !seen.contains(dep) {
                    return Err(OperatorError::InvalidWorkflow(format!(
                        "node '{}' depends on unknown node '{}'",
                        node.id, dep
                    )));
                }
                if *dep == node.id {
                    return Err(OperatorError::InvalidWorkflow(format!(
                        "node '{}' depends on itself",
                        node.id
                    )));
                }
            }
        }

        let order = topological_order(&nodes)?;

        let mut dependents: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for node in &nodes {
            dependents.entry(node.id).or_default();
            for dep in &node.depends_on {
                dependents.entry(*dep).or_default().push(node.id);
            }
        }

        let mut by_id: HashMap<NodeId, ResourceNode> =
            nodes.into_iter().map(|n| (n.id, n)).collect();
        let nodes: Vec<ResourceNode> = order
            .iter()
            .filter_map(|id| by_id.remove(id))
            .collect();
        let index = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id, i))
            .collect();

        Ok(Self {
            nodes,
            index,
            dependents,
        })
    }

    /// Nodes in topological order.
    pub fn nodes(&self) -> &[ResourceNode] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&ResourceNode> {
        self.index.get(&id).map(|&i| &self.nodes[i])
    }

    /// Direct dependents of `id`.
    pub fn dependents(&self, id: NodeId) -> &[NodeId] {
        self.dependents
            .get(&id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Every node that transitively depends on `id`.
    pub fn transitive_dependents(&self, id: NodeId) -> Vec<NodeId> {
        let mut found = Vec::new();
        let mut seen = HashSet::new();
        let mut queue: VecDeque<NodeId> = self.dependents(id).iter().copied().collect();

        while let Some(next) = queue.pop_front() {
            if seen.insert(next) {
                found.push(next);
                queue.extend(self.dependents(next).iter().copied());
            }
        }
        found.sort_by_key(|n| self.index.get(n).copied().unwrap_or(usize::MAX));
        found
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Kahn's algorithm, seeded in declaration order.
fn topological_order(nodes: &[ResourceNode]) -> OperatorResult<Vec<NodeId>> {
    let mut in_degree: HashMap<NodeId, usize> = nodes
        .iter()
        .map(|n| (n.id, n.depends_on.len()))
        .collect();

    let mut queue: VecDeque<NodeId> = nodes
        .iter()
        .filter(|n| n.depends_on.is_empty())
        .map(|n| n.id)
        .collect();

    let mut sorted = Vec::with_capacity(nodes.len());

    while let Some(id) = queue.pop_front() {
        sorted.push(id);

        for node in nodes.iter().filter(|n| n.depends_on.contains(&id)) {
            if let Some(degree) = in_degree.get_mut(&node.id) {
                *degree -= node.depends_on.iter().filter(|d| **d == id).count();
                if *degree == 0 {
                    queue.push_back(node.id);
                }
            }
        }
    }

    if sorted.len() != nodes.len() {
        let cyclic: Vec<String> = nodes
            .iter()
            .filter(|n| !sorted.contains(&n.id))
            .map(|n| n.id.to_string())
            .collect();
        return Err(OperatorError::InvalidWorkflow(format!(
            "dependency cycle among nodes: {}",
            cyclic.join(", ")
        )));
    }

    Ok(sorted)
}
