//! `TaskNode`: graph-execution wrapper around a single task.
//!
//! A node owns its task exclusively and records its place in the graph as
//! id back-references (`dependencies` / `dependents`). The ids point into the
//! arena owned by [`Dag`](crate::Dag); a node never owns its neighbours, and
//! the relations are only mutated through `Dag::add_dependency`, which keeps
//! both sides consistent.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tasks::{RunState, RunnableTask};
use tracing::{info, warn};
use uuid::Uuid;

use crate::events::{Listeners, NodeCallback, NodeUpdate};

// ---------------------------------------------------------------------------
// NodeId
// ---------------------------------------------------------------------------

/// Stable node identifier, independent of the wrapped task's id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Uuid);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for NodeId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ---------------------------------------------------------------------------
// NodeSnapshot
// ---------------------------------------------------------------------------

/// Point-in-time JSON view of a node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub name: String,
    pub description: String,
    pub state: RunState,
    pub finished: bool,
    pub stopped: bool,
    pub task: Value,
}

// ---------------------------------------------------------------------------
// Dispatch claim
// ---------------------------------------------------------------------------

/// Outcome of asking whether a dependent may be dispatched now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Claim {
    /// The caller owns this node's run.
    Granted,
    /// Another dependency is still unfinished.
    Waiting,
    /// Some other branch already dispatched the node.
    Taken,
}

// ---------------------------------------------------------------------------
// TaskNode
// ---------------------------------------------------------------------------

pub struct TaskNode {
    id: NodeId,
    name: Option<String>,
    description: Option<String>,
    task: Arc<dyn RunnableTask>,
    pub(crate) dependencies: Vec<NodeId>,
    pub(crate) dependents: Vec<NodeId>,
    finished: AtomicBool,
    stopped: AtomicBool,
    attempts: AtomicU32,
    dispatched: Mutex<bool>,
    listeners: Listeners,
}

impl TaskNode {
    /// Wrap `task`. Its update callback is forwarded as this node's own
    /// change signal.
    pub fn new(task: Arc<dyn RunnableTask>) -> Self {
        let id = NodeId::new();
        let listeners = Listeners::default();

        let forward = listeners.clone();
        task.on_update(Arc::new(move |state| {
            forward.emit(&NodeUpdate {
                node_id: id,
                state: state.clone(),
            });
        }));

        Self {
            id,
            name: None,
            description: None,
            task,
            dependencies: Vec::new(),
            dependents: Vec::new(),
            finished: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            attempts: AtomicU32::new(0),
            dispatched: Mutex::new(false),
            listeners,
        }
    }

    /// Override the task's own name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Override the task's own description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.name
            .as_deref()
            .unwrap_or(&self.task.metadata().name)
    }

    pub fn description(&self) -> &str {
        self.description
            .as_deref()
            .or(self.task.metadata().description.as_deref())
            .unwrap_or("")
    }

    pub fn task(&self) -> &Arc<dyn RunnableTask> {
        &self.task
    }

    /// The wrapped task's run state.
    pub fn state(&self) -> RunState {
        self.task.state().run_state
    }

    /// True once a run ended with the task in `Completed`.
    pub fn finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Number of `run` attempts made so far.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn dependencies(&self) -> &[NodeId] {
        &self.dependencies
    }

    pub fn dependents(&self) -> &[NodeId] {
        &self.dependents
    }

    pub fn on_update(&self, callback: NodeCallback) {
        self.listeners.push(callback);
    }

    /// Flag the node as stopped and ask the task to stop. Doesn't cascade to
    /// neighbours and doesn't wait for an in-flight run.
    pub async fn stop(&self) {
        info!(node = %self.name(), "Stopping task");
        self.stopped.store(true, Ordering::SeqCst);
        if let Err(e) = self.task.stop().await {
            warn!(node = %self.name(), error = %e, "task did not stop cleanly");
        }
    }

    pub fn serialize(&self) -> NodeSnapshot {
        NodeSnapshot {
            id: self.id,
            name: self.name().to_owned(),
            description: self.description().to_owned(),
            state: self.state(),
            finished: self.finished(),
            stopped: self.stopped(),
            task: self.task.serialize(),
        }
    }

    pub(crate) fn set_finished(&self, finished: bool) {
        self.finished.store(finished, Ordering::SeqCst);
    }

    pub(crate) fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::SeqCst);
    }

    /// Claim the node for dispatch if `ready` says its dependencies are done.
    ///
    /// The readiness check runs under the claim lock, so of several parents
    /// finishing together exactly one is granted the run.
    pub(crate) fn claim(&self, ready: impl FnOnce() -> bool) -> Claim {
        let mut dispatched = self
            .dispatched
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if *dispatched {
            Claim::Taken
        } else if !ready() {
            Claim::Waiting
        } else {
            *dispatched = true;
            Claim::Granted
        }
    }
}

impl fmt::Debug for TaskNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskNode")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("dependencies", &self.dependencies)
            .field("dependents", &self.dependents)
            .field("finished", &self.finished())
            .field("stopped", &self.stopped())
            .finish()
    }
}
