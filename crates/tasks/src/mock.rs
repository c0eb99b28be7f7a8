//! `MockTask`: a scripted test double for `RunnableTask`.
//!
//! Useful in unit and integration tests where a real task body is either
//! unavailable or irrelevant.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    BaseTask, Results, RunnableTask, TaskError, TaskMetadata, TaskState, TaskStatus,
    UpdateCallback,
};

type MapFn = dyn Fn(Option<Value>) -> Result<Value, TaskError> + Send + Sync;

/// Behaviour injected into `MockTask` at construction time.
pub enum MockBehaviour {
    /// Succeed and publish a specific JSON value.
    ReturnValue(Value),
    /// Fail the first `failures` runs, then succeed with `value`.
    FailTimes { failures: usize, value: Value },
    /// Fail every run with the given message.
    AlwaysFail(String),
    /// Compute the published value from the received input.
    Map(Box<MapFn>),
}

/// A mock task that records every input it receives and behaves as scripted.
pub struct MockTask {
    base: BaseTask,
    behaviour: MockBehaviour,
    /// All inputs seen by `run` (in call order).
    pub calls: Arc<Mutex<Vec<Option<Value>>>>,
    prepares: AtomicUsize,
    results_calls: AtomicUsize,
    delay: Option<Duration>,
    completes: bool,
}

impl MockTask {
    fn with_behaviour(name: impl Into<String>, behaviour: MockBehaviour) -> Self {
        Self {
            base: BaseTask::new(name, None),
            behaviour,
            calls: Arc::new(Mutex::new(Vec::new())),
            prepares: AtomicUsize::new(0),
            results_calls: AtomicUsize::new(0),
            delay: None,
            completes: true,
        }
    }

    /// A mock that always succeeds with the given value.
    pub fn returning(name: impl Into<String>, value: Value) -> Self {
        Self::with_behaviour(name, MockBehaviour::ReturnValue(value))
    }

    /// A mock that fails `failures` times before succeeding with `value`.
    pub fn failing_times(name: impl Into<String>, failures: usize, value: Value) -> Self {
        Self::with_behaviour(name, MockBehaviour::FailTimes { failures, value })
    }

    /// A mock that always fails.
    pub fn always_failing(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::with_behaviour(name, MockBehaviour::AlwaysFail(msg.into()))
    }

    /// A mock whose output is derived from its input.
    pub fn mapping(
        name: impl Into<String>,
        f: impl Fn(Option<Value>) -> Result<Value, TaskError> + Send + Sync + 'static,
    ) -> Self {
        Self::with_behaviour(name, MockBehaviour::Map(Box::new(f)))
    }

    /// Sleep for `delay` inside every `run` before acting.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Return `Ok` from `run` without ever reaching `Completed`.
    pub fn never_completing(mut self) -> Self {
        self.completes = false;
        self
    }

    /// Number of times `run` has been called.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Inputs received by `run`, in call order.
    pub fn inputs(&self) -> Vec<Option<Value>> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn prepare_count(&self) -> usize {
        self.prepares.load(Ordering::SeqCst)
    }

    pub fn results_count(&self) -> usize {
        self.results_calls.load(Ordering::SeqCst)
    }

    fn outcome(&self, attempt: usize, input: Option<Value>) -> Result<Value, TaskError> {
        match &self.behaviour {
            MockBehaviour::ReturnValue(v) => Ok(v.clone()),
            MockBehaviour::FailTimes { failures, value } => {
                if attempt <= *failures {
                    Err(TaskError::failed(format!(
                        "{} failed on attempt {attempt}",
                        self.base.name()
                    )))
                } else {
                    Ok(value.clone())
                }
            }
            MockBehaviour::AlwaysFail(msg) => Err(TaskError::Failed(msg.clone())),
            MockBehaviour::Map(f) => f(input),
        }
    }
}

#[async_trait]
impl RunnableTask for MockTask {
    fn metadata(&self) -> &TaskMetadata {
        self.base.metadata()
    }

    fn state(&self) -> TaskState {
        self.base.state()
    }

    async fn prepare(&self) -> Result<(), TaskError> {
        self.prepares.fetch_add(1, Ordering::SeqCst);
        self.base.set_preparing();
        Ok(())
    }

    async fn run(&self, input: Option<Value>) -> Result<(), TaskError> {
        let attempt = {
            let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
            calls.push(input.clone());
            calls.len()
        };
        self.base.set_running();

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.outcome(attempt, input) {
            Ok(value) => {
                self.base
                    .set_results(Results::with_value(value).author(self.base.name()));
                if self.completes {
                    self.base.set_completed();
                    self.base.set_status(TaskStatus::Accepted);
                }
                Ok(())
            }
            Err(e) => {
                self.base.set_failed(e.to_string());
                Err(e)
            }
        }
    }

    async fn stop(&self) -> Result<(), TaskError> {
        self.base.set_stopped();
        Ok(())
    }

    async fn results(&self) -> Result<Results, TaskError> {
        self.results_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.base.results())
    }

    fn on_update(&self, callback: UpdateCallback) {
        self.base.on_update(callback);
    }

    fn serialize(&self) -> Value {
        self.base.serialize()
    }
}
