// src/dag/graph.rs

use std::collections::{BTreeMap, HashMap};

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Bfs;
use tracing::debug;

use crate::config::model::{ConfigFile, TaskConfig};
use crate::dag::spec::{SentinelRole, TaskSpec};
use crate::engine::TaskName;
use crate::errors::{GraphError, Result};
use crate::types::TaskKind;

/// Directed acyclic graph of tasks.
///
/// Task specs live in an index arena (`petgraph::DiGraph`); edges point from
/// predecessor to successor and are addressed by `NodeIndex`, never by
/// reference. Nodes are never removed, so indices stay dense and insertion
/// order is stable.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: DiGraph<TaskSpec, ()>,
    index: HashMap<TaskName, NodeIndex>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from a validated [`ConfigFile`].
    pub fn from_config(cfg: &ConfigFile) -> Result<Self> {
        Self::from_tasks(&cfg.task)
    }

    /// Build a graph from `[task.<name>]` sections.
    ///
    /// Per-task field errors surface as `ConfigError`; unknown or duplicate
    /// `after` entries surface as graph errors. The result is not validated.
    pub fn from_tasks(tasks: &BTreeMap<String, TaskConfig>) -> Result<Self> {
        let mut graph = Self::new();

        for (name, tc) in tasks.iter() {
            graph.add_task(tc.to_spec(name)?)?;
        }

        for (name, tc) in tasks.iter() {
            for dep in tc.after.iter() {
                graph.add_edge(dep, name)?;
            }
        }

        Ok(graph)
    }

    /// Add a task node. Names must be unique.
    pub fn add_task(&mut self, spec: TaskSpec) -> std::result::Result<(), GraphError> {
        if self.index.contains_key(spec.name()) {
            return Err(GraphError::DuplicateTask(spec.name().to_string()));
        }
        let name = spec.name().to_string();
        let idx = self.graph.add_node(spec);
        self.index.insert(name, idx);
        Ok(())
    }

    /// Add a "must complete before" edge.
    pub fn add_edge(
        &mut self,
        predecessor: &str,
        successor: &str,
    ) -> std::result::Result<(), GraphError> {
        if predecessor == successor {
            return Err(GraphError::SelfDependency(predecessor.to_string()));
        }
        let from = self.node(predecessor)?;
        let to = self.node(successor)?;
        if self.graph.contains_edge(from, to) {
            return Err(GraphError::DuplicateEdge(
                predecessor.to_string(),
                successor.to_string(),
            ));
        }
        self.graph.add_edge(from, to, ());
        Ok(())
    }

    /// Check structural invariants:
    /// - no cycles
    /// - exactly one Begin sentinel, with no predecessors
    /// - at most one End sentinel, with no successors and only quality-check
    ///   predecessors
    /// - every task reachable from Begin
    pub fn validate(&self) -> std::result::Result<(), GraphError> {
        self.ensure_acyclic()?;
        let begin = self.validate_sentinels()?;

        let mut reached = vec![false; self.graph.node_count()];
        let mut bfs = Bfs::new(&self.graph, begin);
        while let Some(idx) = bfs.next(&self.graph) {
            reached[idx.index()] = true;
        }

        let unreachable: Vec<TaskName> = self
            .graph
            .node_indices()
            .filter(|idx| !reached[idx.index()])
            .map(|idx| self.graph[idx].name().to_string())
            .collect();

        if !unreachable.is_empty() {
            return Err(GraphError::Unreachable(unreachable));
        }

        debug!(tasks = self.len(), "task graph validated");
        Ok(())
    }

    /// Group tasks into execution waves.
    ///
    /// A task's layer is one more than the deepest layer among its
    /// predecessors (layer 0 for tasks without predecessors). Within a layer,
    /// tasks appear in insertion order.
    pub fn topological_layers(&self) -> std::result::Result<Vec<Vec<TaskName>>, GraphError> {
        let order = self.ensure_acyclic()?;

        let mut depth = vec![0usize; self.graph.node_count()];
        for idx in order {
            depth[idx.index()] = self
                .graph
                .neighbors_directed(idx, Direction::Incoming)
                .map(|pred| depth[pred.index()] + 1)
                .max()
                .unwrap_or(0);
        }

        let layer_count = depth.iter().max().map_or(0, |d| d + 1);
        let mut layers: Vec<Vec<TaskName>> = vec![Vec::new(); layer_count];
        for idx in self.graph.node_indices() {
            layers[depth[idx.index()]].push(self.graph[idx].name().to_string());
        }

        Ok(layers)
    }

    pub fn task(&self, name: &str) -> Option<&TaskSpec> {
        self.index.get(name).map(|idx| &self.graph[*idx])
    }

    /// All task specs, in insertion order.
    pub fn tasks(&self) -> impl Iterator<Item = &TaskSpec> {
        self.graph.node_indices().map(|idx| &self.graph[idx])
    }

    /// Immediate predecessors of a task, in insertion order.
    pub fn dependencies_of(&self, name: &str) -> Vec<&str> {
        self.neighbors(name, Direction::Incoming)
    }

    /// Immediate successors of a task, in insertion order.
    pub fn dependents_of(&self, name: &str) -> Vec<&str> {
        self.neighbors(name, Direction::Outgoing)
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    fn node(&self, name: &str) -> std::result::Result<NodeIndex, GraphError> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| GraphError::UnknownTask(name.to_string()))
    }

    fn neighbors(&self, name: &str, dir: Direction) -> Vec<&str> {
        let Some(idx) = self.index.get(name) else {
            return Vec::new();
        };
        let mut found: Vec<NodeIndex> = self.graph.neighbors_directed(*idx, dir).collect();
        found.sort();
        found
            .into_iter()
            .map(|n| self.graph[n].name())
            .collect()
    }

    fn ensure_acyclic(&self) -> std::result::Result<Vec<NodeIndex>, GraphError> {
        toposort(&self.graph, None)
            .map_err(|cycle| GraphError::Cycle(self.graph[cycle.node_id()].name().to_string()))
    }

    /// Returns the Begin node.
    fn validate_sentinels(&self) -> std::result::Result<NodeIndex, GraphError> {
        let mut begin: Option<NodeIndex> = None;
        let mut end: Option<NodeIndex> = None;

        for idx in self.graph.node_indices() {
            let spec = &self.graph[idx];
            let Some(role) = spec.sentinel_role() else {
                continue;
            };
            let slot = match role {
                SentinelRole::Begin => &mut begin,
                SentinelRole::End => &mut end,
            };
            if let Some(existing) = slot {
                return Err(GraphError::InvalidSentinel {
                    task: spec.name().to_string(),
                    reason: format!(
                        "graph already has a {:?} sentinel '{}'",
                        role,
                        self.graph[*existing].name()
                    ),
                });
            }
            *slot = Some(idx);
        }

        let begin = begin.ok_or(GraphError::MissingBegin)?;

        if self
            .graph
            .neighbors_directed(begin, Direction::Incoming)
            .next()
            .is_some()
        {
            return Err(GraphError::InvalidSentinel {
                task: self.graph[begin].name().to_string(),
                reason: "Begin must not have predecessors".to_string(),
            });
        }

        if let Some(end) = end {
            let name = self.graph[end].name().to_string();
            if self
                .graph
                .neighbors_directed(end, Direction::Outgoing)
                .next()
                .is_some()
            {
                return Err(GraphError::InvalidSentinel {
                    task: name,
                    reason: "End must not have successors".to_string(),
                });
            }

            let mut preds = self
                .graph
                .neighbors_directed(end, Direction::Incoming)
                .peekable();
            if preds.peek().is_none() {
                return Err(GraphError::InvalidSentinel {
                    task: name,
                    reason: "End must follow at least one quality check".to_string(),
                });
            }
            if let Some(bad) = preds.find(|p| self.graph[*p].kind() != TaskKind::QualityCheck) {
                return Err(GraphError::InvalidSentinel {
                    task: name,
                    reason: format!(
                        "End may only follow quality checks, but follows '{}'",
                        self.graph[bad].name()
                    ),
                });
            }
        }

        Ok(begin)
    }
}
