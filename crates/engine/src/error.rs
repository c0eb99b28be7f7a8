//! Engine-level error types.

use tasks::TaskError;
use thiserror::Error;

use crate::NodeId;

/// Errors produced by the graph engine (construction + execution).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    // ------ Construction errors ------

    /// Adding the dependency would close a loop in the graph.
    #[error("Adding dependency \"{node_id}\" creates a cycle in the DAG.")]
    Cycle { node_id: NodeId },

    /// A node was asked to depend on itself.
    #[error("A node cannot depend on itself.")]
    SelfDependency,

    /// The node is already part of the graph.
    #[error("node \"{0}\" is already in the DAG")]
    DuplicateNode(NodeId),

    /// The id does not belong to any node of the graph.
    #[error("node \"{0}\" is not in the DAG")]
    NodeNotFound(NodeId),

    /// Topological sort could not order every node.
    #[error("DAG contains a cycle")]
    CycleDetected,

    /// Two steps of a pipeline definition share the same id.
    #[error("duplicate step id: '{0}'")]
    DuplicateStep(String),

    /// A step depends on a step id that doesn't exist in the definition.
    #[error("step '{step}' depends on unknown step '{dependency}'")]
    UnknownStep { step: String, dependency: String },

    // ------ Ordering errors ------

    /// `init`/`run` was called before every dependency finished.
    #[error("dependencies of node \"{node_id}\" are not complete")]
    DependenciesIncomplete { node_id: NodeId },

    /// The graph has nodes but none without dependencies.
    #[error("DAG has nodes but no root nodes")]
    NoRoots,

    /// The node was already dispatched during this run.
    #[error("node \"{node_id}\" has already been dispatched")]
    AlreadyDispatched { node_id: NodeId },

    /// `start` was already called on this graph.
    #[error("DAG has already been started")]
    AlreadyStarted,

    // ------ Execution errors ------

    /// The task's `prepare` failed.
    #[error("failed to prepare \"{node_id}\": {source}")]
    PrepareFailed {
        node_id: NodeId,
        #[source]
        source: TaskError,
    },

    /// The task ran but its results could not be fetched for its dependents.
    #[error("failed to fetch results of \"{node_id}\": {source}")]
    ResultsFailed {
        node_id: NodeId,
        #[source]
        source: TaskError,
    },

    /// Every attempt to run the task failed.
    #[error("Failed to execute \"{name}\" after {attempts} attempts: {source}")]
    TaskFailed {
        node_id: NodeId,
        name: String,
        attempts: u32,
        #[source]
        source: TaskError,
    },
}

impl EngineError {
    /// Structural errors come from building or driving the graph wrongly and
    /// are never retried.
    pub fn is_structural(&self) -> bool {
        !matches!(
            self,
            Self::PrepareFailed { .. } | Self::ResultsFailed { .. } | Self::TaskFailed { .. }
        )
    }
}
