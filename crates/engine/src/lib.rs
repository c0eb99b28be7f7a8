//! `engine` crate: task graph construction, cycle prevention, topological
//! ordering, and the dependency-gated execution engine.

pub mod error;
pub mod events;
pub mod executor;
pub mod graph;
pub mod models;
pub mod node;
pub mod pipeline;

pub use error::EngineError;
pub use events::{NodeCallback, NodeUpdate};
pub use executor::RunOptions;
pub use graph::{Dag, DagMetadata, DagSnapshot, DagStatus};
pub use models::{PipelineDefinition, StepDefinition};
pub use node::{NodeId, NodeSnapshot, TaskNode};
pub use pipeline::{build_dag, validate_definition, BuiltPipeline};

#[cfg(test)]
mod executor_tests;
