//! Pipeline validation and construction. Run this before executing a
//! definition.
//!
//! Rules enforced:
//! 1. Step ids must be unique within the pipeline.
//! 2. Every `depends_on` entry must reference a step of the pipeline.
//! 3. The dependencies must be acyclic (enforced edge by edge by the graph).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tasks::SimpleTask;
use tracing::debug;

use crate::models::PipelineDefinition;
use crate::{Dag, EngineError, NodeId, TaskNode};

/// A graph built from a definition, with the step id → node id mapping.
pub struct BuiltPipeline {
    pub dag: Dag,
    pub steps: HashMap<String, NodeId>,
}

/// Check ids and references without building anything.
///
/// # Errors
/// - [`EngineError::DuplicateStep`] if two steps share an id.
/// - [`EngineError::UnknownStep`] if a dependency references a missing step.
pub fn validate_definition(definition: &PipelineDefinition) -> Result<(), EngineError> {
    let mut seen: HashSet<&str> = HashSet::new();
    for step in &definition.steps {
        if !seen.insert(step.id.as_str()) {
            return Err(EngineError::DuplicateStep(step.id.clone()));
        }
    }

    for step in &definition.steps {
        for dependency in &step.depends_on {
            if !seen.contains(dependency.as_str()) {
                return Err(EngineError::UnknownStep {
                    step: step.id.clone(),
                    dependency: dependency.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Validate `definition` and build a graph of [`SimpleTask`] nodes.
///
/// # Errors
/// Everything [`validate_definition`] reports, plus [`EngineError::Cycle`] /
/// [`EngineError::SelfDependency`] from the dependency edges.
pub fn build_dag(definition: &PipelineDefinition) -> Result<BuiltPipeline, EngineError> {
    validate_definition(definition)?;

    let mut dag = match &definition.description {
        Some(description) => Dag::with_description(&definition.name, description),
        None => Dag::new(&definition.name),
    };

    let mut steps = HashMap::with_capacity(definition.steps.len());
    for step in &definition.steps {
        let name = step.name.clone().unwrap_or_else(|| step.id.clone());
        let mut task = SimpleTask::new(
            name,
            step.description.clone(),
            Duration::from_millis(step.duration_ms),
        );
        if let Some(output) = &step.output {
            task = task.with_output(output.clone());
        }
        let id = dag.add_node(TaskNode::new(Arc::new(task)))?;
        steps.insert(step.id.clone(), id);
    }

    for step in &definition.steps {
        let node = steps[&step.id];
        for dependency in &step.depends_on {
            dag.add_dependency(node, steps[dependency])?;
        }
    }

    debug!(
        pipeline = %definition.name,
        steps = steps.len(),
        "pipeline built"
    );
    Ok(BuiltPipeline { dag, steps })
}

impl BuiltPipeline {
    /// Step ids in execution order.
    pub fn order(&self) -> Result<Vec<String>, EngineError> {
        let by_node: HashMap<NodeId, &str> =
            self.steps.iter().map(|(step, &id)| (id, step.as_str())).collect();
        Ok(self
            .dag
            .nodes()?
            .into_iter()
            .map(|n| by_node[&n.id()].to_owned())
            .collect())
    }

    /// Result value published by a finished step.
    pub async fn output(&self, step: &str) -> Option<Value> {
        let node = self.dag.node(*self.steps.get(step)?)?;
        node.task().results().await.ok()?.value
    }
}
