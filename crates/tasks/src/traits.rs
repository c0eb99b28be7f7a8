//! The `RunnableTask` trait: the contract every task body must fulfil.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::{Results, TaskError, TaskMetadata, TaskState};

/// Callback fired with a fresh state snapshot whenever a task mutates its state.
pub type UpdateCallback = Arc<dyn Fn(&TaskState) + Send + Sync>;

/// The core task trait.
///
/// The engine only ever talks to tasks through this trait object; what a task
/// does internally (open a connection, issue a credential, verify a proof) is
/// opaque to it. Methods take `&self` so that `stop` and `state` can be called
/// while a `run` is in flight; implementations own their interior mutability
/// (see [`BaseTask`](crate::BaseTask)).
#[async_trait]
pub trait RunnableTask: Send + Sync {
    /// Identity of the task.
    fn metadata(&self) -> &TaskMetadata;

    /// Snapshot of the current state.
    fn state(&self) -> TaskState;

    /// Called once the task's dependencies are satisfied, before `run`.
    async fn prepare(&self) -> Result<(), TaskError>;

    /// Execute the task. `input` is the parent's result value, or `None` for
    /// tasks without dependencies.
    async fn run(&self, input: Option<Value>) -> Result<(), TaskError>;

    /// Ask the task to stop. Must not block on an in-flight `run`.
    async fn stop(&self) -> Result<(), TaskError>;

    /// The task's result value object.
    async fn results(&self) -> Result<Results, TaskError>;

    /// Register a callback fired on every state mutation.
    fn on_update(&self, callback: UpdateCallback);

    /// JSON view of the task for observers.
    fn serialize(&self) -> Value;
}
