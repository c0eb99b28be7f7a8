//! `SimpleTask`: a built-in task that waits for a fixed duration and then
//! completes successfully.
//!
//! Used by the CLI to drive pipelines without any external collaborator, and
//! handy for demos. Its result value is the configured output, or the input
//! it was run with when no output is configured, so chains of simple tasks
//! forward their root value untouched.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::{
    BaseTask, Results, RunState, RunnableTask, TaskError, TaskMetadata, TaskState, TaskStatus,
    UpdateCallback,
};

pub struct SimpleTask {
    base: BaseTask,
    duration: Duration,
    output: Option<Value>,
}

impl SimpleTask {
    pub fn new(name: impl Into<String>, description: Option<String>, duration: Duration) -> Self {
        Self {
            base: BaseTask::new(name, description),
            duration,
            output: None,
        }
    }

    /// Publish `output` as the result value instead of forwarding the input.
    pub fn with_output(mut self, output: Value) -> Self {
        self.output = Some(output);
        self
    }
}

#[async_trait]
impl RunnableTask for SimpleTask {
    fn metadata(&self) -> &TaskMetadata {
        self.base.metadata()
    }

    fn state(&self) -> TaskState {
        self.base.state()
    }

    async fn prepare(&self) -> Result<(), TaskError> {
        if self.base.run_state() == RunState::Stopped {
            return Err(TaskError::Stopped);
        }
        self.base.set_preparing();
        Ok(())
    }

    async fn run(&self, input: Option<Value>) -> Result<(), TaskError> {
        if self.base.run_state() == RunState::Stopped {
            return Err(TaskError::Stopped);
        }
        self.base.set_running();
        self.base.set_status(TaskStatus::Pending);
        self.base
            .add_message(format!("waiting for {} ms", self.duration.as_millis()));
        debug!(task = %self.base.name(), ?input, "simple task running");

        tokio::time::sleep(self.duration).await;

        if self.base.run_state() == RunState::Stopped {
            return Err(TaskError::Stopped);
        }

        let value = self.output.clone().or(input).unwrap_or(Value::Null);
        self.base
            .set_results(Results::with_value(value).author(self.base.name()));
        self.base.set_completed();
        self.base.set_status(TaskStatus::Accepted);
        self.base
            .add_message(format!("done waiting for {} ms", self.duration.as_millis()));
        Ok(())
    }

    async fn stop(&self) -> Result<(), TaskError> {
        self.base.set_stopped();
        Ok(())
    }

    async fn results(&self) -> Result<Results, TaskError> {
        Ok(self.base.results())
    }

    fn on_update(&self, callback: UpdateCallback) {
        self.base.on_update(callback);
    }

    fn serialize(&self) -> Value {
        self.base.serialize()
    }
}
