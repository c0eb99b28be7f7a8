//! `BaseTask`: shared state bookkeeping for task implementations.
//!
//! Concrete tasks embed a `BaseTask` and delegate the observable parts of
//! [`RunnableTask`](crate::RunnableTask) to it: metadata, the state snapshot,
//! update callbacks, stored results and the JSON view. Every mutator fires
//! all registered callbacks once, after the state lock has been released.

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::{json, Value};
use tracing::trace;

use crate::{Results, RunState, TaskMetadata, TaskState, TaskStatus, UpdateCallback};

pub struct BaseTask {
    metadata: TaskMetadata,
    state: Mutex<TaskState>,
    callbacks: Mutex<Vec<UpdateCallback>>,
    results: Mutex<Option<Results>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl BaseTask {
    pub fn new(name: impl Into<String>, description: Option<String>) -> Self {
        Self {
            metadata: TaskMetadata::new(name, description),
            state: Mutex::new(TaskState::default()),
            callbacks: Mutex::new(Vec::new()),
            results: Mutex::new(None),
        }
    }

    pub fn metadata(&self) -> &TaskMetadata {
        &self.metadata
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn state(&self) -> TaskState {
        lock(&self.state).clone()
    }

    pub fn run_state(&self) -> RunState {
        lock(&self.state).run_state
    }

    /// Callbacks accumulate; registering one never replaces another.
    pub fn on_update(&self, callback: UpdateCallback) {
        lock(&self.callbacks).push(callback);
    }

    /// Apply `f` to the state and notify every callback with the result.
    pub fn update(&self, f: impl FnOnce(&mut TaskState)) {
        let snapshot = {
            let mut state = lock(&self.state);
            f(&mut state);
            state.clone()
        };
        let callbacks = lock(&self.callbacks).clone();
        trace!(
            task = %self.metadata.name,
            run_state = ?snapshot.run_state,
            "task state changed"
        );
        for callback in callbacks {
            callback(&snapshot);
        }
    }

    pub fn set_preparing(&self) {
        let msg = format!("Task '{}' is being prepared.", self.metadata.name);
        self.update(|s| {
            s.messages.push(msg);
            s.run_state = RunState::Preparing;
        });
    }

    pub fn set_running(&self) {
        let msg = format!("Task '{}' has started running.", self.metadata.name);
        self.update(|s| {
            s.messages.push(msg);
            s.run_state = RunState::Running;
        });
    }

    pub fn set_completed(&self) {
        self.update(|s| s.run_state = RunState::Completed);
    }

    /// Marks both the run state and the status as failed and records `error`.
    pub fn set_failed(&self, error: impl Into<String>) {
        let error = error.into();
        self.update(|s| {
            s.errors.push(error);
            s.run_state = RunState::Failed;
            s.status = TaskStatus::Failed;
        });
    }

    pub fn set_stopped(&self) {
        let msg = format!("Task '{}' was stopped.", self.metadata.name);
        self.update(|s| {
            s.messages.push(msg);
            s.run_state = RunState::Stopped;
        });
    }

    pub fn set_status(&self, status: TaskStatus) {
        self.update(|s| s.status = status);
    }

    pub fn add_message(&self, message: impl Into<String>) {
        let message = message.into();
        self.update(|s| s.messages.push(message));
    }

    pub fn add_warning(&self, warning: impl Into<String>) {
        let warning = warning.into();
        self.update(|s| s.warnings.push(warning));
    }

    pub fn add_error(&self, error: impl Into<String>) {
        let error = error.into();
        self.update(|s| s.errors.push(error));
    }

    pub fn set_results(&self, results: Results) {
        *lock(&self.results) = Some(results);
    }

    /// Stored results, or an empty value object if the task never produced any.
    pub fn results(&self) -> Results {
        lock(&self.results).clone().unwrap_or_default()
    }

    pub fn serialize(&self) -> Value {
        json!({
            "id": self.metadata.id,
            "metadata": self.metadata,
            "state": self.state(),
        })
    }
}
