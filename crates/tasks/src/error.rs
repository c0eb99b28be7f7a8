//! Task-level error type.

use thiserror::Error;

/// Errors returned by a task's lifecycle methods.
///
/// The engine treats every variant returned from `run` as recoverable and
/// retries it up to the configured limit. Graph-structure problems never
/// show up here; those live in the engine crate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// The task body failed; a later attempt may succeed.
    #[error("task failed: {0}")]
    Failed(String),

    /// The task was stopped before it could finish.
    #[error("task was stopped")]
    Stopped,

    /// The task does not support the requested operation.
    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

impl TaskError {
    /// Shorthand for [`TaskError::Failed`].
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}
