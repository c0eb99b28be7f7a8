//! Graph execution engine.
//!
//! [`Dag::start`] is the central orchestrator:
//! 1. Finds the root nodes and runs them concurrently.
//! 2. Runs each node with a bounded, fixed-delay retry loop.
//! 3. When a node completes, fans out to its dependents concurrently, passing
//!    the node's result value as their input. A dependent only runs once all
//!    of its dependencies have finished, and at most once per start.
//! 4. A stopped node is never retried and never fans out.
//! 5. Joins every fan-out all-settled: one failing branch never cancels its
//!    siblings. Failures are logged and kept in the graph's failure ledger.

use std::sync::atomic::Ordering;
use std::sync::PoisonError;
use std::time::Duration;

use futures::future::{join_all, BoxFuture, FutureExt};
use serde_json::Value;
use tasks::{RunState, TaskError};
use tracing::{debug, error, info, instrument, warn};

use crate::node::Claim;
use crate::{Dag, EngineError, NodeId};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Retry policy applied to every node of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Total number of attempts per node (values below 1 count as 1).
    pub max_retries: u32,
    /// Fixed pause between two attempts.
    pub delay: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_retries: 1,
            delay: Duration::from_millis(3000),
        }
    }
}

/// How a dependent branch of a fan-out settled without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Branch {
    Ran,
    Waiting,
    AlreadyDispatched,
    Stopped,
}

impl Dag {
    /// Run the whole graph.
    ///
    /// Resolves once every branch reachable from the roots has settled.
    ///
    /// # Errors
    /// - [`EngineError::AlreadyStarted`] on a second call.
    /// - [`EngineError::NoRoots`] if the graph has nodes but no root.
    /// - Otherwise the first failure recorded during the run; the complete
    ///   list is available from [`Dag::failures`].
    #[instrument(skip(self, options), fields(dag = %self.metadata().name))]
    pub async fn start(&self, options: &RunOptions) -> Result<(), EngineError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(EngineError::AlreadyStarted);
        }
        if self.is_empty() {
            return Ok(());
        }

        let roots: Vec<usize> = (0..self.nodes.len())
            .filter(|&i| self.nodes[i].dependencies.is_empty())
            .collect();
        if roots.is_empty() {
            return Err(EngineError::NoRoots);
        }

        info!(
            "starting {} nodes from {} roots",
            self.nodes.len(),
            roots.len()
        );

        let branches = roots.iter().map(|&root| async move {
            if self.nodes[root].claim(|| true) != Claim::Granted {
                return Ok(());
            }
            self.prepare_and_execute(root, None, options).await
        });
        for (&root, outcome) in roots.iter().zip(join_all(branches).await) {
            if let Err(e) = outcome {
                debug!(node = %self.nodes[root].name(), error = %e, "root branch failed");
            }
        }

        match self.first_failure() {
            Some(err) => Err(err),
            None => {
                info!("all branches settled");
                Ok(())
            }
        }
    }

    /// Prepare a node's task once its dependencies have finished.
    ///
    /// # Errors
    /// [`EngineError::DependenciesIncomplete`] if a dependency is unfinished,
    /// [`EngineError::PrepareFailed`] if the task's `prepare` fails.
    pub async fn init_node(&self, id: NodeId) -> Result<(), EngineError> {
        self.init_at(self.position(id)?).await
    }

    /// Run a single node (and, on completion, its ready dependents) with
    /// `input` as the task input.
    ///
    /// # Errors
    /// [`EngineError::DependenciesIncomplete`] if a dependency is unfinished,
    /// [`EngineError::AlreadyDispatched`] if the node already ran (or is
    /// running) in this run, [`EngineError::TaskFailed`] once every attempt
    /// failed.
    pub async fn run_node(
        &self,
        id: NodeId,
        input: Option<Value>,
        options: &RunOptions,
    ) -> Result<(), EngineError> {
        let index = self.position(id)?;
        match self.nodes[index].claim(|| self.dependencies_complete(index)) {
            Claim::Granted => self.execute(index, input, options).await,
            Claim::Waiting => Err(EngineError::DependenciesIncomplete { node_id: id }),
            Claim::Taken => Err(EngineError::AlreadyDispatched { node_id: id }),
        }
    }

    /// Stop a single node. Neither dependencies nor dependents are touched,
    /// but a stopped node never finishes, so its dependents never run.
    pub async fn stop_node(&self, id: NodeId) -> Result<(), EngineError> {
        self.nodes[self.position(id)?].stop().await;
        Ok(())
    }

    async fn init_at(&self, index: usize) -> Result<(), EngineError> {
        let node = &self.nodes[index];
        if !self.dependencies_complete(index) {
            return Err(EngineError::DependenciesIncomplete { node_id: node.id() });
        }
        node.task()
            .prepare()
            .await
            .map_err(|source| EngineError::PrepareFailed {
                node_id: node.id(),
                source,
            })
    }

    async fn prepare_and_execute(
        &self,
        index: usize,
        input: Option<Value>,
        options: &RunOptions,
    ) -> Result<(), EngineError> {
        if self.nodes[index].stopped() {
            info!("Skipping stopped task \"{}\".", self.nodes[index].name());
            return Ok(());
        }
        if let Err(err) = self.init_at(index).await {
            error!(node = %self.nodes[index].name(), error = %err, "could not prepare task");
            self.record_failure(err.clone());
            return Err(err);
        }
        self.execute(index, input, options).await
    }

    /// The node-execution procedure: retry loop, completion bookkeeping and
    /// fan-out. Boxed because fan-out recurses into it.
    fn execute<'a>(
        &'a self,
        index: usize,
        input: Option<Value>,
        options: &'a RunOptions,
    ) -> BoxFuture<'a, Result<(), EngineError>> {
        async move {
            let node = &self.nodes[index];
            let name = node.name();
            let max_retries = options.max_retries.max(1);

            for attempt in 1..=max_retries {
                if node.stopped() {
                    info!("\"{name}\" was stopped; dependents will not run.");
                    return Ok(());
                }
                if !self.dependencies_complete(index) {
                    return Err(EngineError::DependenciesIncomplete { node_id: node.id() });
                }

                debug!(node = %name, attempt, ?input, "running task");
                node.record_attempt();

                let err = match node.task().run(input.clone()).await {
                    Ok(()) => break,
                    Err(err) => err,
                };
                if matches!(err, TaskError::Stopped) || node.stopped() {
                    info!("\"{name}\" was stopped; dependents will not run.");
                    return Ok(());
                }

                error!(node = %name, attempt, error = %err, "Error on attempt {attempt} for \"{name}\"");
                if attempt < max_retries {
                    info!(
                        "Retrying \"{name}\" in {} seconds...",
                        options.delay.as_secs_f64()
                    );
                    tokio::time::sleep(options.delay).await;
                } else {
                    error!("Failed to execute \"{name}\" after {max_retries} attempts.");
                    let failure = EngineError::TaskFailed {
                        node_id: node.id(),
                        name: name.to_owned(),
                        attempts: max_retries,
                        source: err,
                    };
                    self.record_failure(failure.clone());
                    return Err(failure);
                }
            }

            if node.stopped() {
                info!("\"{name}\" was stopped; dependents will not run.");
                return Ok(());
            }
            let finished = node.state() == RunState::Completed;
            node.set_finished(finished);
            if !finished {
                warn!(
                    node = %name,
                    state = ?node.state(),
                    "task returned without completing; dependents will not run"
                );
                return Ok(());
            }

            info!("Completed \"{name}\".");
            self.fan_out(index, options).await
        }
        .boxed()
    }

    async fn fan_out(&self, index: usize, options: &RunOptions) -> Result<(), EngineError> {
        let node = &self.nodes[index];
        let dependents: Vec<usize> = node
            .dependents
            .iter()
            .filter_map(|id| self.index.get(id).copied())
            .collect();
        if dependents.is_empty() {
            return Ok(());
        }

        // Fetched once for every dependent.
        let results = match node.task().results().await {
            Ok(results) => results,
            Err(source) => {
                let err = EngineError::ResultsFailed {
                    node_id: node.id(),
                    source,
                };
                error!(node = %node.name(), error = %err, "Failed to notify dependents");
                self.record_failure(err.clone());
                return Err(err);
            }
        };

        let branches = dependents
            .iter()
            .map(|&dependent| self.trigger(dependent, results.value.clone(), options));
        let outcomes = join_all(branches).await;

        for (&dependent, outcome) in dependents.iter().zip(outcomes) {
            let name = self.nodes[dependent].name();
            match outcome {
                Ok(Branch::Ran) => info!("Dependent task \"{name}\" completed successfully."),
                Ok(Branch::Waiting) => {
                    debug!(node = %name, "dependent waits for its remaining dependencies")
                }
                Ok(Branch::AlreadyDispatched) => {
                    debug!(node = %name, "dependent already dispatched by another parent")
                }
                Ok(Branch::Stopped) => info!("Dependent task \"{name}\" was stopped; skipping."),
                Err(e) => error!("Dependent task \"{name}\" failed with error: {e}"),
            }
        }
        Ok(())
    }

    async fn trigger(
        &self,
        index: usize,
        input: Option<Value>,
        options: &RunOptions,
    ) -> Result<Branch, EngineError> {
        let dependent = &self.nodes[index];

        // Refresh the dependent's own results before it is considered.
        if let Err(e) = dependent.task().results().await {
            debug!(node = %dependent.name(), error = %e, "results refresh failed");
        }

        match dependent.claim(|| self.dependencies_complete(index)) {
            Claim::Granted => {}
            Claim::Waiting => return Ok(Branch::Waiting),
            Claim::Taken => return Ok(Branch::AlreadyDispatched),
        }
        if dependent.stopped() {
            return Ok(Branch::Stopped);
        }

        self.prepare_and_execute(index, input, options).await?;
        Ok(Branch::Ran)
    }

    fn record_failure(&self, err: EngineError) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(err);
    }

    fn first_failure(&self) -> Option<EngineError> {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .first()
            .cloned()
    }
}
