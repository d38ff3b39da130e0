//! Directed graph over step keys for dependency queries.
//!
//! Backs the execution plan graph with:
//! - Direct upstream/downstream lookup
//! - Transitive closure in either direction
//! - Topological sorting for deterministic row ordering
//! - Cycle detection at plan-construction time
//!
//! **Note:** This module is internal to `runview-gantt` to preserve freedom
//! to change internals.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::error::{Error, Result};

/// A directed graph of step keys.
///
/// Edges point from a dependency to its dependent (parent to child).
/// Insertion order is recorded for deterministic tie-breaking.
#[derive(Debug, Clone, Default)]
pub(crate) struct StepGraph {
    graph: DiGraph<String, ()>,
    index_map: HashMap<String, NodeIndex>,
    insertion_order: Vec<NodeIndex>,
}

impl StepGraph {
    /// Creates a new empty graph.
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Adds a step key to the graph.
    ///
    /// If the key already exists, this is a no-op.
    pub(crate) fn add_step(&mut self, key: &str) -> NodeIndex {
        if let Some(&idx) = self.index_map.get(key) {
            return idx;
        }
        let idx = self.graph.add_node(key.to_string());
        self.index_map.insert(key.to_string(), idx);
        self.insertion_order.push(idx);
        idx
    }

    /// Adds a dependency edge from `upstream` to `downstream`.
    ///
    /// Both keys must already be present.
    pub(crate) fn add_dependency(&mut self, upstream: NodeIndex, downstream: NodeIndex) -> Result<()> {
        self.graph
            .node_weight(upstream)
            .ok_or_else(|| Error::GraphNodeNotFound {
                node: format!("index {}", upstream.index()),
            })?;
        self.graph
            .node_weight(downstream)
            .ok_or_else(|| Error::GraphNodeNotFound {
                node: format!("index {}", downstream.index()),
            })?;

        self.graph.add_edge(upstream, downstream, ());
        Ok(())
    }

    /// Returns the node index for a key, if it exists.
    pub(crate) fn get_index(&self, key: &str) -> Option<NodeIndex> {
        self.index_map.get(key).copied()
    }

    /// Returns the direct neighbors of a node in the given direction,
    /// sorted by insertion order for determinism.
    fn neighbors(&self, node: NodeIndex, direction: Direction) -> Vec<String> {
        let mut indices: Vec<NodeIndex> = self.graph.neighbors_directed(node, direction).collect();
        indices.sort_by_key(|n| {
            self.insertion_order
                .iter()
                .position(|&i| i == *n)
                .unwrap_or(usize::MAX)
        });
        indices
            .into_iter()
            .filter_map(|idx| self.graph.node_weight(idx).cloned())
            .collect()
    }

    /// Returns the direct upstream dependencies of a key.
    pub(crate) fn upstream_of(&self, key: &str) -> Vec<String> {
        self.get_index(key)
            .map(|idx| self.neighbors(idx, Direction::Incoming))
            .unwrap_or_default()
    }

    /// Returns the direct downstream dependents of a key.
    pub(crate) fn downstream_of(&self, key: &str) -> Vec<String> {
        self.get_index(key)
            .map(|idx| self.neighbors(idx, Direction::Outgoing))
            .unwrap_or_default()
    }

    /// Returns all keys transitively reachable from `key` in `direction`,
    /// excluding `key` itself.
    ///
    /// Uses a visited set so traversal terminates even on malformed
    /// (cyclic) graphs.
    pub(crate) fn closure(&self, key: &str, direction: Direction) -> HashSet<String> {
        let mut reached = HashSet::new();
        let Some(start) = self.get_index(key) else {
            return reached;
        };

        let mut visited: HashSet<NodeIndex> = HashSet::from([start]);
        let mut queue: VecDeque<NodeIndex> = VecDeque::from([start]);
        while let Some(current) = queue.pop_front() {
            for neighbor in self.graph.neighbors_directed(current, direction) {
                if visited.insert(neighbor) {
                    if let Some(weight) = self.graph.node_weight(neighbor) {
                        reached.insert(weight.clone());
                    }
                    queue.push_back(neighbor);
                }
            }
        }
        reached
    }

    /// Returns a topologically sorted list of keys.
    ///
    /// Uses Kahn's algorithm with deterministic tie-breaking: when multiple
    /// nodes have zero in-degree, they are processed in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph contains a cycle.
    pub(crate) fn toposort(&self) -> Result<Vec<String>> {
        let node_count = self.graph.node_count();
        if node_count == 0 {
            return Ok(Vec::new());
        }

        let mut in_degree: HashMap<NodeIndex, usize> = HashMap::with_capacity(node_count);
        for idx in self.graph.node_indices() {
            in_degree.insert(idx, 0);
        }
        for edge in self.graph.edge_references() {
            *in_degree.entry(edge.target()).or_insert(0) += 1;
        }

        let mut queue: VecDeque<NodeIndex> = self
            .insertion_order
            .iter()
            .filter(|&&idx| in_degree.get(&idx).copied().unwrap_or(0) == 0)
            .copied()
            .collect();

        let mut result = Vec::with_capacity(node_count);

        while let Some(idx) = queue.pop_front() {
            let key = self
                .graph
                .node_weight(idx)
                .ok_or_else(|| Error::GraphNodeNotFound {
                    node: format!("index {}", idx.index()),
                })?
                .clone();
            result.push(key);

            let mut neighbors: Vec<NodeIndex> = self
                .graph
                .neighbors_directed(idx, Direction::Outgoing)
                .collect();
            neighbors.sort_by_key(|n| {
                self.insertion_order
                    .iter()
                    .position(|&i| i == *n)
                    .unwrap_or(usize::MAX)
            });

            for neighbor in neighbors {
                if let Some(deg) = in_degree.get_mut(&neighbor) {
                    *deg = deg.saturating_sub(1);
                    if *deg == 0 {
                        queue.push_back(neighbor);
                    }
                }
            }
        }

        if result.len() != node_count {
            // Report a node still carrying in-degree (deterministic choice).
            let cycle_node = self
                .insertion_order
                .iter()
                .find(|&&idx| in_degree.get(&idx).copied().unwrap_or(0) > 0)
                .and_then(|&idx| self.graph.node_weight(idx))
                .map_or_else(|| "unknown".to_string(), ToString::to_string);

            return Err(Error::CycleDetected {
                cycle: vec![cycle_node],
            });
        }

        Ok(result)
    }
}
