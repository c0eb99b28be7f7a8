//! `tasks` crate: the `RunnableTask` trait, its state model, and built-in
//! task implementations.
//!
//! Every task body (connection setup, credential issuance, proof
//! verification, …) must implement [`RunnableTask`]. The engine crate wraps
//! tasks in graph nodes and drives them through this trait object.

pub mod base;
pub mod error;
pub mod mock;
pub mod simple;
pub mod state;
pub mod traits;

pub use base::BaseTask;
pub use error::TaskError;
pub use simple::SimpleTask;
pub use state::{Results, RunState, TaskMetadata, TaskState, TaskStatus};
pub use traits::{RunnableTask, UpdateCallback};
