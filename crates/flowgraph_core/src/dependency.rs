// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node-level dependency graph.
//!
//! An arc `a -> b` means `b` depends on `a`: `b` has an input connected to
//! an output of `a`.

use crate::node::NodeId;
use indexmap::{IndexMap, IndexSet};

/// Directed dependency graph between the nodes of a graph
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    dependents: IndexMap<NodeId, IndexSet<NodeId>>,
    dependencies: IndexMap<NodeId, IndexSet<NodeId>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

impl DependencyGraph {
    /// Create a graph over the given nodes with no arcs
    pub fn new(nodes: impl IntoIterator<Item = NodeId>) -> Self {
        let mut graph = Self::default();
        for node in nodes {
            graph.add_node(node);
        }
        graph
    }

    /// Add a node without arcs
    pub fn add_node(&mut self, node: NodeId) {
        self.dependents.entry(node).or_default();
        self.dependencies.entry(node).or_default();
    }

    /// Record that `dependent` reads from `dependency`
    pub fn add_dependency(&mut self, dependency: NodeId, dependent: NodeId) {
        self.add_node(dependency);
        self.add_node(dependent);
        self.dependents.entry(dependency).or_default().insert(dependent);
        self.dependencies.entry(dependent).or_default().insert(dependency);
    }

    /// Number of nodes
    pub fn node_count(&self) -> usize {
        self.dependents.len()
    }

    /// Whether the node is part of the graph
    pub fn contains(&self, node: NodeId) -> bool {
        self.dependents.contains_key(&node)
    }

    /// Nodes reading directly from `node`
    pub fn dependents(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.dependents.get(&node).into_iter().flatten().copied()
    }

    /// Nodes `node` reads from directly
    pub fn dependencies(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.dependencies.get(&node).into_iter().flatten().copied()
    }

    /// Whether there is any directed cycle
    pub fn has_cycles(&self) -> bool {
        self.find_cycle().is_some()
    }

    /// Nodes forming some directed cycle, in order, if there is one.
    ///
    /// Iterative depth-first search so that long chains cannot exhaust the
    /// native stack.
    pub fn find_cycle(&self) -> Option<Vec<NodeId>> {
        let mut marks: IndexMap<NodeId, Mark> = IndexMap::new();
        for &root in self.dependents.keys() {
            if marks.contains_key(&root) {
                continue;
            }
            let mut path: Vec<NodeId> = Vec::new();
            let mut stack: Vec<(NodeId, usize)> = vec![(root, 0)];
            marks.insert(root, Mark::InProgress);
            path.push(root);

            while let Some((node, next)) = stack.last_mut() {
                let node = *node;
                let child = self.dependents.get(&node).and_then(|set| set.get_index(*next)).copied();
                *next += 1;
                match child {
                    Some(child) => match marks.get(&child) {
                        Some(Mark::InProgress) => {
                            let start = path.iter().position(|n| *n == child).unwrap_or(0);
                            return Some(path[start..].to_vec());
                        }
                        Some(Mark::Done) => {}
                        None => {
                            marks.insert(child, Mark::InProgress);
                            path.push(child);
                            stack.push((child, 0));
                        }
                    },
                    None => {
                        marks.insert(node, Mark::Done);
                        path.pop();
                        stack.pop();
                    }
                }
            }
        }
        None
    }

    /// `target` and every node with a directed path to it
    pub fn ancestors_of(&self, target: NodeId) -> IndexSet<NodeId> {
        Self::walk(target, |node| self.dependencies(node))
    }

    /// `source` and every node reachable from it
    pub fn descendants_of(&self, source: NodeId) -> IndexSet<NodeId> {
        Self::walk(source, |node| self.dependents(node))
    }

    fn walk<I>(start: NodeId, next: impl Fn(NodeId) -> I) -> IndexSet<NodeId>
    where
        I: Iterator<Item = NodeId>,
    {
        let mut seen = IndexSet::new();
        let mut stack = vec![start];
        while let Some(node) = stack.pop() {
            if seen.insert(node) {
                stack.extend(next(node).filter(|n| !seen.contains(n)));
            }
        }
        seen
    }
}
