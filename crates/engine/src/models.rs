//! Declarative pipeline definitions.
//!
//! A definition describes a pipeline of built-in [`SimpleTask`] steps and
//! their dependencies; it can be read from JSON and turned into a runnable
//! [`Dag`](crate::Dag) with [`build_dag`](crate::pipeline::build_dag).
//!
//! [`SimpleTask`]: tasks::SimpleTask

use serde::{Deserialize, Serialize};
use serde_json::Value;

fn default_duration_ms() -> u64 {
    1000
}

// ---------------------------------------------------------------------------
// StepDefinition
// ---------------------------------------------------------------------------

/// A single step of the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    /// Unique identifier within this pipeline (referenced by `depends_on`).
    pub id: String,
    /// Display name; defaults to `id`.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// How long the step works before completing.
    #[serde(default = "default_duration_ms")]
    pub duration_ms: u64,
    /// Result value to publish; when absent the step forwards its input.
    #[serde(default)]
    pub output: Option<Value>,
    /// Ids of the steps that must finish first.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl StepDefinition {
    /// Convenience constructor for testing.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            description: None,
            duration_ms: default_duration_ms(),
            output: None,
            depends_on: Vec::new(),
        }
    }

    pub fn after(mut self, ids: &[&str]) -> Self {
        self.depends_on = ids.iter().map(|s| s.to_string()).collect();
        self
    }
}

// ---------------------------------------------------------------------------
// PipelineDefinition
// ---------------------------------------------------------------------------

/// A complete pipeline definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub steps: Vec<StepDefinition>,
}

impl PipelineDefinition {
    pub fn new(name: impl Into<String>, steps: Vec<StepDefinition>) -> Self {
        Self {
            name: name.into(),
            description: None,
            steps,
        }
    }
}
