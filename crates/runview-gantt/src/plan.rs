//! The execution plan graph: the static DAG of steps for one run.
//!
//! A plan is supplied once, when the run's plan becomes known, and is never
//! mutated afterward. All dependency queries (direct edges, transitive
//! closures, topological row order) go through the adjacency index built at
//! construction time rather than re-scanning the step list.

use std::collections::{HashMap, HashSet};

use petgraph::Direction;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::graph::StepGraph;

/// A single step in the execution plan.
///
/// Immutable for the lifetime of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStep {
    /// Unique step key.
    pub key: String,
    /// Keys of the steps this step's inputs depend on.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Whether the step's outputs are persisted to durable storage.
    #[serde(default)]
    pub persisted: bool,
}

impl ExecutionStep {
    /// Creates a step with no dependencies.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            depends_on: Vec::new(),
            persisted: false,
        }
    }

    /// Adds an upstream dependency key.
    #[must_use]
    pub fn depends_on(mut self, key: impl Into<String>) -> Self {
        self.depends_on.push(key.into());
        self
    }

    /// Marks the step's outputs as persisted.
    #[must_use]
    pub const fn persisted(mut self) -> Self {
        self.persisted = true;
        self
    }
}

/// The plan-description shape supplied by the external data source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanDescription {
    /// The steps of the plan, in the source's order.
    pub steps: Vec<ExecutionStep>,
}

/// The static DAG of steps and their data dependencies.
///
/// Constructed once per run; read-only afterward, so it may be shared
/// across the reducer, the selection engine, and the filter without
/// synchronization.
#[derive(Debug, Clone)]
pub struct ExecutionPlanGraph {
    steps: Vec<ExecutionStep>,
    index: HashMap<String, usize>,
    graph: StepGraph,
    topo_order: Vec<String>,
}

impl ExecutionPlanGraph {
    /// Builds a plan graph from an external plan description.
    ///
    /// Dependency keys that name steps absent from the description are
    /// tolerated and contribute no edge: a re-execution plan for a subset
    /// of steps legitimately references upstream steps outside the subset.
    ///
    /// # Errors
    ///
    /// Returns an error if the description contains a duplicate step key
    /// or the dependency edges form a cycle.
    pub fn from_description(description: PlanDescription) -> Result<Self> {
        Self::from_steps(description.steps)
    }

    /// Builds a plan graph from a list of steps.
    ///
    /// # Errors
    ///
    /// Returns an error if a step key is duplicated or the dependency
    /// edges form a cycle.
    pub fn from_steps(steps: Vec<ExecutionStep>) -> Result<Self> {
        let mut index = HashMap::with_capacity(steps.len());
        let mut graph = StepGraph::new();

        for (position, step) in steps.iter().enumerate() {
            if index.insert(step.key.clone(), position).is_some() {
                return Err(Error::DuplicateStep {
                    key: step.key.clone(),
                });
            }
            graph.add_step(&step.key);
        }

        for step in &steps {
            let Some(downstream) = graph.get_index(&step.key) else {
                continue;
            };
            for dependency in &step.depends_on {
                let Some(upstream) = graph.get_index(dependency) else {
                    tracing::warn!(
                        step = %step.key,
                        dependency = %dependency,
                        "plan references a dependency outside the plan; edge skipped"
                    );
                    continue;
                };
                graph.add_dependency(upstream, downstream)?;
            }
        }

        let topo_order = graph.toposort()?;

        Ok(Self {
            steps,
            index,
            graph,
            topo_order,
        })
    }

    /// Returns the number of steps in the plan.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if the plan has no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Returns the steps in their original (insertion) order.
    #[must_use]
    pub fn steps(&self) -> &[ExecutionStep] {
        &self.steps
    }

    /// Returns the step with the given key, if present.
    #[must_use]
    pub fn step(&self, key: &str) -> Option<&ExecutionStep> {
        self.index.get(key).and_then(|&pos| self.steps.get(pos))
    }

    /// Returns true if the plan contains the given key.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Returns the direct upstream dependencies of a key, in insertion order.
    #[must_use]
    pub fn dependencies_of(&self, key: &str) -> Vec<String> {
        self.graph.upstream_of(key)
    }

    /// Returns the direct downstream dependents of a key, in insertion order.
    #[must_use]
    pub fn dependents_of(&self, key: &str) -> Vec<String> {
        self.graph.downstream_of(key)
    }

    /// Returns all transitive upstream dependencies of a key (ancestors),
    /// excluding the key itself.
    #[must_use]
    pub fn upstream_closure(&self, key: &str) -> HashSet<String> {
        self.graph.closure(key, Direction::Incoming)
    }

    /// Returns all transitive downstream dependents of a key (descendants),
    /// excluding the key itself.
    #[must_use]
    pub fn downstream_closure(&self, key: &str) -> HashSet<String> {
        self.graph.closure(key, Direction::Outgoing)
    }

    /// Returns the step keys in deterministic topological order.
    ///
    /// Suitable as a stable row order for timeline rendering: parents
    /// always appear above their children, ties broken by plan order.
    #[must_use]
    pub fn topo_order(&self) -> &[String] {
        &self.topo_order
    }
}
