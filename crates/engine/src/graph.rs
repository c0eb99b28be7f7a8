//! `Dag`: the arena that owns every node of a pipeline.
//!
//! Rules enforced:
//! 1. Node ids are unique within the graph.
//! 2. Dependencies only reference nodes of this graph.
//! 3. The dependency relation is acyclic at all times; the edge that would
//!    close a loop is rejected when it is added, not when the graph runs.
//!
//! The topological order is cached and recomputed on every structural change.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tasks::{RunState, TaskState, TaskStatus};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::events::{NodeCallback, NodeUpdate, UpdateBus};
use crate::{EngineError, NodeId, NodeSnapshot, TaskNode};

// ---------------------------------------------------------------------------
// Metadata & snapshots
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DagMetadata {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

/// Overall state of the graph, derived from its nodes on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DagStatus {
    pub run_state: RunState,
    pub status: TaskStatus,
}

/// Point-in-time JSON view of a graph, nodes in topological order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DagSnapshot {
    pub metadata: DagMetadata,
    pub status: DagStatus,
    pub nodes: Vec<NodeSnapshot>,
}

// ---------------------------------------------------------------------------
// Dag
// ---------------------------------------------------------------------------

pub struct Dag {
    metadata: DagMetadata,
    pub(crate) nodes: Vec<TaskNode>,
    pub(crate) index: HashMap<NodeId, usize>,
    /// Cached topological order as arena indices; `None` if sorting failed.
    order: Option<Vec<usize>>,
    bus: UpdateBus,
    pub(crate) started: AtomicBool,
    pub(crate) failures: Mutex<Vec<EngineError>>,
}

impl Dag {
    pub fn new(name: impl Into<String>) -> Self {
        Self::build(name.into(), None)
    }

    pub fn with_description(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::build(name.into(), Some(description.into()))
    }

    fn build(name: String, description: Option<String>) -> Self {
        Self {
            metadata: DagMetadata {
                id: Uuid::new_v4(),
                name,
                description,
            },
            nodes: Vec::new(),
            index: HashMap::new(),
            order: Some(Vec::new()),
            bus: UpdateBus::default(),
            started: AtomicBool::new(false),
            failures: Mutex::new(Vec::new()),
        }
    }

    pub fn metadata(&self) -> &DagMetadata {
        &self.metadata
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Option<&TaskNode> {
        self.index.get(&id).map(|&i| &self.nodes[i])
    }

    pub(crate) fn position(&self, id: NodeId) -> Result<usize, EngineError> {
        self.index
            .get(&id)
            .copied()
            .ok_or(EngineError::NodeNotFound(id))
    }

    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    /// Insert `node` and return its id.
    ///
    /// # Errors
    /// [`EngineError::DuplicateNode`] if a node with the same id is already
    /// present; duplicates are rejected rather than merged.
    pub fn add_node(&mut self, node: TaskNode) -> Result<NodeId, EngineError> {
        let id = node.id();
        if self.index.contains_key(&id) {
            return Err(EngineError::DuplicateNode(id));
        }

        let bus = self.bus.clone();
        node.on_update(Arc::new(move |update: &NodeUpdate| bus.publish(update)));

        self.index.insert(id, self.nodes.len());
        self.nodes.push(node);
        self.refresh_order();
        Ok(id)
    }

    /// Make `node` depend on `dependency`.
    ///
    /// Adding an edge that already exists is a no-op. On error the graph is
    /// left untouched.
    ///
    /// # Errors
    /// - [`EngineError::NodeNotFound`] if either id is unknown.
    /// - [`EngineError::SelfDependency`] if both ids are the same.
    /// - [`EngineError::Cycle`] if `dependency` already depends, directly or
    ///   transitively, on `node`.
    pub fn add_dependency(&mut self, node: NodeId, dependency: NodeId) -> Result<(), EngineError> {
        let from = self.position(node)?;
        let to = self.position(dependency)?;
        if from == to {
            return Err(EngineError::SelfDependency);
        }
        if self.nodes[from].dependencies.contains(&dependency) {
            return Ok(());
        }
        if self.reaches(to, from) {
            return Err(EngineError::Cycle { node_id: dependency });
        }

        self.nodes[from].dependencies.push(dependency);
        self.nodes[to].dependents.push(node);
        self.refresh_order();
        Ok(())
    }

    /// Depth-first search over `dependencies`: can `target` be reached from
    /// `start`?
    fn reaches(&self, start: usize, target: usize) -> bool {
        let mut stack = vec![start];
        let mut visited = HashSet::new();

        while let Some(current) = stack.pop() {
            if current == target {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            stack.extend(
                self.nodes[current]
                    .dependencies
                    .iter()
                    .filter_map(|id| self.index.get(id).copied()),
            );
        }
        false
    }

    // -----------------------------------------------------------------------
    // Ordering
    // -----------------------------------------------------------------------

    fn refresh_order(&mut self) {
        self.order = self.topological_order();
    }

    /// Kahn's algorithm. The ready set is ordered by arena index, so nodes
    /// with no constraint between them keep their insertion order.
    fn topological_order(&self) -> Option<Vec<usize>> {
        let mut in_degree: Vec<usize> = self
            .nodes
            .iter()
            .map(|n| n.dependencies.len())
            .collect();

        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, &d)| d == 0)
            .map(|(i, _)| i)
            .collect();

        let mut sorted = Vec::with_capacity(self.nodes.len());

        while let Some(current) = ready.pop_first() {
            sorted.push(current);
            for dependent in &self.nodes[current].dependents {
                let Some(&d) = self.index.get(dependent) else {
                    continue;
                };
                in_degree[d] -= 1;
                if in_degree[d] == 0 {
                    ready.insert(d);
                }
            }
        }

        // Anything left over sits on a cycle.
        (sorted.len() == self.nodes.len()).then_some(sorted)
    }

    /// All nodes, every dependency before its dependents.
    ///
    /// # Errors
    /// [`EngineError::CycleDetected`] if the relation is not acyclic.
    pub fn nodes(&self) -> Result<Vec<&TaskNode>, EngineError> {
        let order = self.order.as_ref().ok_or(EngineError::CycleDetected)?;
        Ok(order.iter().map(|&i| &self.nodes[i]).collect())
    }

    /// Nodes without dependencies, in insertion order.
    pub fn root_nodes(&self) -> Vec<&TaskNode> {
        self.nodes
            .iter()
            .filter(|n| n.dependencies.is_empty())
            .collect()
    }

    pub(crate) fn dependencies_complete(&self, index: usize) -> bool {
        self.nodes[index].dependencies.iter().all(|id| {
            self.index
                .get(id)
                .is_some_and(|&i| self.nodes[i].finished())
        })
    }

    /// True if every dependency of `id` has finished.
    pub fn are_dependencies_complete(&self, id: NodeId) -> Result<bool, EngineError> {
        Ok(self.dependencies_complete(self.position(id)?))
    }

    // -----------------------------------------------------------------------
    // Observation
    // -----------------------------------------------------------------------

    /// Invoke `callback` whenever any node of the graph changes.
    pub fn on_update(&self, callback: NodeCallback) {
        self.bus.on_update(callback);
    }

    /// Channel view of the same updates as [`Dag::on_update`].
    pub fn subscribe(&self) -> broadcast::Receiver<NodeUpdate> {
        self.bus.subscribe()
    }

    /// Every failure recorded by the last execution, in the order they
    /// happened.
    pub fn failures(&self) -> Vec<EngineError> {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn status(&self) -> DagStatus {
        let states: Vec<TaskState> = self.nodes.iter().map(|n| n.task().state()).collect();
        DagStatus {
            run_state: overall_run_state(&states),
            status: overall_status(&states),
        }
    }

    /// # Errors
    /// [`EngineError::CycleDetected`], as for [`Dag::nodes`].
    pub fn serialize(&self) -> Result<DagSnapshot, EngineError> {
        Ok(DagSnapshot {
            metadata: self.metadata.clone(),
            status: self.status(),
            nodes: self.nodes()?.into_iter().map(TaskNode::serialize).collect(),
        })
    }
}

fn overall_run_state(states: &[TaskState]) -> RunState {
    let any = |s: RunState| states.iter().any(|t| t.run_state == s);

    if states.is_empty() {
        RunState::NotStarted
    } else if states.iter().all(|t| t.run_state == RunState::Completed) {
        RunState::Completed
    } else if any(RunState::Failed) {
        RunState::Failed
    } else if any(RunState::Running) || any(RunState::Preparing) {
        RunState::Running
    } else if any(RunState::Stopped) {
        RunState::Stopped
    } else if states.iter().all(|t| t.run_state == RunState::NotStarted) {
        RunState::NotStarted
    } else {
        // Some completed, the rest not yet started.
        RunState::Running
    }
}

fn overall_status(states: &[TaskState]) -> TaskStatus {
    let any = |s: TaskStatus| states.iter().any(|t| t.status == s);

    if any(TaskStatus::Failed) {
        TaskStatus::Failed
    } else if any(TaskStatus::Rejected) {
        TaskStatus::Rejected
    } else if !states.is_empty() && states.iter().all(|t| t.status == TaskStatus::Accepted) {
        TaskStatus::Accepted
    } else if states.iter().any(|t| t.status != TaskStatus::NotStarted) {
        TaskStatus::Pending
    } else {
        TaskStatus::NotStarted
    }
}
