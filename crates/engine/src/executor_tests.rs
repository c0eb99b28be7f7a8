//! Scenario tests for the execution engine.
//!
//! These tests drive whole graphs of `MockTask`s through `Dag::start` with a
//! paused tokio clock, so retry delays cost nothing. Log output is captured
//! with a small `tracing_subscriber` layer to assert on what operators see.

use std::fmt::Debug;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tasks::mock::MockTask;
use tasks::{RunState, RunnableTask, SimpleTask, TaskError, TaskStatus};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

use crate::{Dag, EngineError, NodeId, NodeUpdate, RunOptions, TaskNode};

// ---------------------------------------------------------------------------
// Log capture
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<(Level, String)>>>);

struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}

impl<S: Subscriber> Layer<S> for CapturedLogs {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor(String::new());
        event.record(&mut visitor);
        self.0
            .lock()
            .unwrap()
            .push((*event.metadata().level(), visitor.0));
    }
}

impl CapturedLogs {
    /// Route this thread's events into the capture until the guard drops.
    fn install(&self) -> tracing::subscriber::DefaultGuard {
        tracing::subscriber::set_default(tracing_subscriber::registry().with(self.clone()))
    }

    fn contains(&self, level: Level, message: &str) -> bool {
        self.0
            .lock()
            .unwrap()
            .iter()
            .any(|(l, m)| *l == level && m == message)
    }

    fn count_starting_with(&self, level: Level, prefix: &str) -> usize {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, m)| *l == level && m.starts_with(prefix))
            .count()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn options(max_retries: u32, delay_ms: u64) -> RunOptions {
    RunOptions {
        max_retries,
        delay: Duration::from_millis(delay_ms),
    }
}

fn add(dag: &mut Dag, task: &Arc<MockTask>) -> NodeId {
    dag.add_node(TaskNode::new(task.clone())).unwrap()
}

fn plus_one(name: &str) -> Arc<MockTask> {
    Arc::new(MockTask::mapping(name, |input| {
        let n = input
            .and_then(|v| v.as_i64())
            .ok_or_else(|| TaskError::failed("expected a number"))?;
        Ok(json!(n + 1))
    }))
}

// ============================================================
// Retry
// ============================================================

#[tokio::test(start_paused = true)]
async fn retries_once_then_succeeds() {
    let logs = CapturedLogs::default();
    let _guard = logs.install();

    let a = Arc::new(MockTask::failing_times("Task A", 1, json!(1)));
    let mut dag = Dag::with_description("Test DAG", "This is a test DAG");
    let id = add(&mut dag, &a);

    dag.start(&options(2, 100)).await.unwrap();

    assert_eq!(a.call_count(), 2);
    assert_eq!(dag.node(id).unwrap().attempts(), 2);
    assert!(dag.node(id).unwrap().finished());
    assert!(logs.contains(Level::ERROR, "Error on attempt 1 for \"Task A\""));
    assert!(logs.contains(Level::INFO, "Retrying \"Task A\" in 0.1 seconds..."));
    assert!(logs.contains(Level::INFO, "Completed \"Task A\"."));
    assert!(dag.failures().is_empty());
}

#[tokio::test(start_paused = true)]
async fn k_failures_below_limit_mean_k_plus_one_runs_and_k_error_logs() {
    let logs = CapturedLogs::default();
    let _guard = logs.install();

    let a = Arc::new(MockTask::failing_times("Flaky", 3, json!("ok")));
    let mut dag = Dag::new("retry-bound");
    add(&mut dag, &a);

    dag.start(&options(5, 1000)).await.unwrap();

    assert_eq!(a.call_count(), 4);
    assert_eq!(logs.count_starting_with(Level::ERROR, "Error on attempt"), 3);
    assert_eq!(a.state().run_state, RunState::Completed);
}

#[tokio::test(start_paused = true)]
async fn retry_delay_is_fixed_not_exponential() {
    let a = Arc::new(MockTask::failing_times("Flaky", 3, json!("ok")));
    let mut dag = Dag::new("fixed-delay");
    add(&mut dag, &a);

    let started = tokio::time::Instant::now();
    dag.start(&options(4, 1000)).await.unwrap();

    // Three pauses of one second each; exponential back-off would take 7s.
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_surface_the_final_error() {
    let logs = CapturedLogs::default();
    let _guard = logs.install();

    let a = Arc::new(MockTask::always_failing("Task A", "Test error"));
    let mut dag = Dag::new("Test DAG");
    let id = add(&mut dag, &a);

    let err = dag.start(&options(2, 100)).await.unwrap_err();

    assert_eq!(
        err,
        EngineError::TaskFailed {
            node_id: id,
            name: "Task A".into(),
            attempts: 2,
            source: TaskError::Failed("Test error".into()),
        }
    );
    assert_eq!(a.call_count(), 2);
    assert!(logs.contains(Level::ERROR, "Error on attempt 1 for \"Task A\""));
    assert!(logs.contains(Level::ERROR, "Error on attempt 2 for \"Task A\""));
    assert!(logs.contains(Level::INFO, "Retrying \"Task A\" in 0.1 seconds..."));
    assert!(logs.contains(Level::ERROR, "Failed to execute \"Task A\" after 2 attempts."));
    assert!(!dag.node(id).unwrap().finished());
}

#[tokio::test(start_paused = true)]
async fn zero_retries_still_runs_once() {
    let a = Arc::new(MockTask::returning("once", json!(null)));
    let mut dag = Dag::new("zero");
    add(&mut dag, &a);

    dag.start(&options(0, 0)).await.unwrap();
    assert_eq!(a.call_count(), 1);
}

// ============================================================
// Ordering & propagation
// ============================================================

#[tokio::test(start_paused = true)]
async fn executes_chain_from_root() {
    let a = Arc::new(MockTask::returning("A", json!("a")));
    let b = Arc::new(MockTask::returning("B", json!("b")));
    let c = Arc::new(MockTask::returning("C", json!("c")));
    let mut dag = Dag::new("chain");
    let (ia, ib, ic) = (add(&mut dag, &a), add(&mut dag, &b), add(&mut dag, &c));
    dag.add_dependency(ib, ia).unwrap();
    dag.add_dependency(ic, ib).unwrap();

    dag.start(&RunOptions::default()).await.unwrap();

    assert_eq!(a.inputs(), vec![None]);
    assert_eq!(b.inputs(), vec![Some(json!("a"))]);
    assert_eq!(c.inputs(), vec![Some(json!("b"))]);
    for task in [&a, &b, &c] {
        assert_eq!(task.prepare_count(), 1);
    }
    assert!(dag.nodes().unwrap().iter().all(|n| n.finished()));
}

#[tokio::test(start_paused = true)]
async fn propagates_parent_result_to_child() {
    // A (1 + 1) → B (+1)
    let a = Arc::new(MockTask::returning("A", json!(1 + 1)));
    let b = plus_one("B");
    let mut dag = Dag::new("propagate");
    let (ia, ib) = (add(&mut dag, &a), add(&mut dag, &b));
    dag.add_dependency(ib, ia).unwrap();

    dag.start(&RunOptions::default()).await.unwrap();

    assert_eq!(b.inputs(), vec![Some(json!(2))]);
    assert_eq!(a.results().await.unwrap().value, Some(json!(2)));
    assert_eq!(b.results().await.unwrap().value, Some(json!(3)));
}

#[tokio::test(start_paused = true)]
async fn parent_results_fetched_once_and_dependents_refreshed() {
    let a = Arc::new(MockTask::returning("A", json!(1)));
    let b = Arc::new(MockTask::returning("B", json!(2)));
    let c = Arc::new(MockTask::returning("C", json!(3)));
    let mut dag = Dag::new("refresh");
    let (ia, ib, ic) = (add(&mut dag, &a), add(&mut dag, &b), add(&mut dag, &c));
    dag.add_dependency(ib, ia).unwrap();
    dag.add_dependency(ic, ia).unwrap();

    dag.start(&RunOptions::default()).await.unwrap();

    assert_eq!(a.results_count(), 1);
    // B and C have no dependents, so their only results call is the refresh.
    assert_eq!(b.results_count(), 1);
    assert_eq!(c.results_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn diamond_join_runs_once_with_last_parent_value() {
    //   A
    //  / \
    // B   C (slower)
    //  \ /
    //   D
    let a = Arc::new(MockTask::returning("A", json!("a")));
    let b = Arc::new(MockTask::returning("B", json!("b")));
    let c = Arc::new(MockTask::returning("C", json!("c")).with_delay(Duration::from_millis(50)));
    let d = Arc::new(MockTask::returning("D", json!("d")));
    let mut dag = Dag::new("diamond");
    let ia = add(&mut dag, &a);
    let ib = add(&mut dag, &b);
    let ic = add(&mut dag, &c);
    let id = add(&mut dag, &d);
    dag.add_dependency(ib, ia).unwrap();
    dag.add_dependency(ic, ia).unwrap();
    dag.add_dependency(id, ib).unwrap();
    dag.add_dependency(id, ic).unwrap();

    dag.start(&RunOptions::default()).await.unwrap();

    assert_eq!(d.inputs(), vec![Some(json!("c"))]);
    assert_eq!(d.prepare_count(), 1);
    assert!(dag.node(id).unwrap().finished());
}

#[tokio::test(start_paused = true)]
async fn diamond_join_with_parents_finishing_together_runs_once() {
    let a = Arc::new(MockTask::returning("A", json!(0)));
    let b = Arc::new(MockTask::returning("B", json!(1)).with_delay(Duration::from_millis(10)));
    let c = Arc::new(MockTask::returning("C", json!(2)).with_delay(Duration::from_millis(10)));
    let d = Arc::new(MockTask::returning("D", json!(3)));
    let mut dag = Dag::new("tie");
    let ia = add(&mut dag, &a);
    let ib = add(&mut dag, &b);
    let ic = add(&mut dag, &c);
    let id = add(&mut dag, &d);
    dag.add_dependency(ib, ia).unwrap();
    dag.add_dependency(ic, ia).unwrap();
    dag.add_dependency(id, ib).unwrap();
    dag.add_dependency(id, ic).unwrap();

    dag.start(&RunOptions::default()).await.unwrap();

    assert_eq!(d.call_count(), 1);
    assert_eq!(d.prepare_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn roots_run_concurrently() {
    let x = Arc::new(MockTask::returning("X", json!(null)).with_delay(Duration::from_secs(1)));
    let y = Arc::new(MockTask::returning("Y", json!(null)).with_delay(Duration::from_secs(1)));
    let mut dag = Dag::new("parallel");
    add(&mut dag, &x);
    add(&mut dag, &y);

    let started = tokio::time::Instant::now();
    dag.start(&RunOptions::default()).await.unwrap();

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(1) && elapsed < Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn task_that_does_not_complete_does_not_fan_out() {
    let a = Arc::new(MockTask::returning("A", json!(1)).never_completing());
    let b = Arc::new(MockTask::returning("B", json!(2)));
    let mut dag = Dag::new("stalled");
    let (ia, ib) = (add(&mut dag, &a), add(&mut dag, &b));
    dag.add_dependency(ib, ia).unwrap();

    dag.start(&RunOptions::default()).await.unwrap();

    assert!(!dag.node(ia).unwrap().finished());
    assert_eq!(b.call_count(), 0);
    assert_eq!(a.results_count(), 0);
}

// ============================================================
// Partial failure
// ============================================================

#[tokio::test(start_paused = true)]
async fn failing_dependent_does_not_stop_its_sibling() {
    let logs = CapturedLogs::default();
    let _guard = logs.install();

    let a = Arc::new(MockTask::returning("A", json!(1)));
    let b = Arc::new(MockTask::always_failing("B", "boom"));
    let c = Arc::new(MockTask::returning("C", json!(3)));
    let mut dag = Dag::new("isolation");
    let (ia, ib, ic) = (add(&mut dag, &a), add(&mut dag, &b), add(&mut dag, &c));
    dag.add_dependency(ib, ia).unwrap();
    dag.add_dependency(ic, ia).unwrap();

    let err = dag.start(&RunOptions::default()).await.unwrap_err();

    assert!(matches!(err, EngineError::TaskFailed { node_id, .. } if node_id == ib));
    assert_eq!(c.call_count(), 1);
    assert!(dag.node(ic).unwrap().finished());
    assert!(!dag.node(ib).unwrap().finished());
    assert!(logs.contains(Level::INFO, "Dependent task \"C\" completed successfully."));
    assert_eq!(
        logs.count_starting_with(Level::ERROR, "Dependent task \"B\" failed with error:"),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn failed_branch_halts_its_descendants() {
    let a = Arc::new(MockTask::always_failing("A", "down"));
    let b = Arc::new(MockTask::returning("B", json!(null)));
    let mut dag = Dag::new("halt");
    let (ia, ib) = (add(&mut dag, &a), add(&mut dag, &b));
    dag.add_dependency(ib, ia).unwrap();

    assert!(dag.start(&options(3, 10)).await.is_err());
    assert_eq!(a.call_count(), 3);
    assert_eq!(b.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn every_failure_is_kept_and_the_first_is_returned() {
    let a = Arc::new(MockTask::returning("A", json!(1)));
    let fast = Arc::new(MockTask::always_failing("Fast", "first"));
    let slow = Arc::new(
        MockTask::always_failing("Slow", "second").with_delay(Duration::from_millis(500)),
    );
    let healthy_root = Arc::new(MockTask::returning("Other", json!(null)));
    let mut dag = Dag::new("ledger");
    let ia = add(&mut dag, &a);
    let ifast = add(&mut dag, &fast);
    let islow = add(&mut dag, &slow);
    add(&mut dag, &healthy_root);
    dag.add_dependency(ifast, ia).unwrap();
    dag.add_dependency(islow, ia).unwrap();

    let err = dag.start(&RunOptions::default()).await.unwrap_err();

    assert!(matches!(err, EngineError::TaskFailed { node_id, .. } if node_id == ifast));
    let failures = dag.failures();
    assert_eq!(failures.len(), 2);
    assert!(matches!(&failures[1], EngineError::TaskFailed { node_id, .. } if *node_id == islow));
    assert_eq!(healthy_root.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn failing_root_does_not_block_other_roots() {
    let x = Arc::new(MockTask::always_failing("X", "nope"));
    let y = Arc::new(MockTask::returning("Y", json!(null)));
    let z = Arc::new(MockTask::returning("Z", json!(null)));
    let mut dag = Dag::new("roots");
    let ix = add(&mut dag, &x);
    let iy = add(&mut dag, &y);
    let iz = add(&mut dag, &z);
    dag.add_dependency(iz, iy).unwrap();

    let err = dag.start(&RunOptions::default()).await.unwrap_err();

    assert!(matches!(err, EngineError::TaskFailed { node_id, .. } if node_id == ix));
    assert!(dag.node(iz).unwrap().finished());
}

// ============================================================
// Structural errors
// ============================================================

#[tokio::test]
async fn empty_graph_starts_trivially() {
    let dag = Dag::new("empty");
    dag.start(&RunOptions::default()).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn second_start_is_rejected() {
    let a = Arc::new(MockTask::returning("A", json!(null)));
    let mut dag = Dag::new("once");
    add(&mut dag, &a);

    dag.start(&RunOptions::default()).await.unwrap();
    assert_eq!(
        dag.start(&RunOptions::default()).await,
        Err(EngineError::AlreadyStarted)
    );
    assert_eq!(a.call_count(), 1);
}

#[tokio::test]
async fn graph_without_roots_is_rejected() {
    // Plant a cycle behind add_dependency's back so no root exists.
    let a = Arc::new(MockTask::returning("A", json!(null)));
    let b = Arc::new(MockTask::returning("B", json!(null)));
    let mut dag = Dag::new("rootless");
    let (ia, ib) = (add(&mut dag, &a), add(&mut dag, &b));
    dag.nodes[0].dependencies.push(ib);
    dag.nodes[1].dependencies.push(ia);

    assert_eq!(
        dag.start(&RunOptions::default()).await,
        Err(EngineError::NoRoots)
    );
    assert_eq!(a.call_count(), 0);
}

#[tokio::test]
async fn init_and_run_refuse_unfinished_dependencies() {
    let a = Arc::new(MockTask::returning("A", json!(null)));
    let b = Arc::new(MockTask::returning("B", json!(null)));
    let mut dag = Dag::new("order");
    let (ia, ib) = (add(&mut dag, &a), add(&mut dag, &b));
    dag.add_dependency(ib, ia).unwrap();

    assert!(!dag.are_dependencies_complete(ib).unwrap());
    assert_eq!(
        dag.init_node(ib).await,
        Err(EngineError::DependenciesIncomplete { node_id: ib })
    );
    assert_eq!(
        dag.run_node(ib, None, &RunOptions::default()).await,
        Err(EngineError::DependenciesIncomplete { node_id: ib })
    );
    assert_eq!(b.prepare_count(), 0);
    assert_eq!(b.call_count(), 0);

    dag.init_node(ia).await.unwrap();
    assert_eq!(a.prepare_count(), 1);
}

#[tokio::test]
async fn running_a_node_directly_fans_out() {
    let a = Arc::new(MockTask::returning("A", json!(5)));
    let b = plus_one("B");
    let mut dag = Dag::new("direct");
    let (ia, ib) = (add(&mut dag, &a), add(&mut dag, &b));
    dag.add_dependency(ib, ia).unwrap();

    dag.run_node(ia, Some(json!("seed")), &RunOptions::default())
        .await
        .unwrap();

    assert_eq!(a.inputs(), vec![Some(json!("seed"))]);
    assert!(dag.are_dependencies_complete(ib).unwrap());
    assert_eq!(b.results().await.unwrap().value, Some(json!(6)));
}

#[tokio::test]
async fn stop_does_not_cascade() {
    let a = Arc::new(MockTask::returning("A", json!(null)));
    let b = Arc::new(MockTask::returning("B", json!(null)));
    let mut dag = Dag::new("stop");
    let (ia, ib) = (add(&mut dag, &a), add(&mut dag, &b));
    dag.add_dependency(ib, ia).unwrap();

    dag.stop_node(ia).await.unwrap();

    assert!(dag.node(ia).unwrap().stopped());
    assert_eq!(a.state().run_state, RunState::Stopped);
    assert!(!dag.node(ib).unwrap().stopped());
    assert_eq!(b.state().run_state, RunState::NotStarted);
}

#[tokio::test(start_paused = true)]
async fn stopping_a_running_node_keeps_its_dependents_idle() {
    let a = Arc::new(SimpleTask::new("A", None, Duration::from_millis(100)));
    let b = Arc::new(MockTask::returning("B", json!(null)));
    let mut dag = Dag::new("stop-midway");
    let ia = dag.add_node(TaskNode::new(a.clone())).unwrap();
    let ib = add(&mut dag, &b);
    dag.add_dependency(ib, ia).unwrap();

    let opts = options(2, 10);
    let (outcome, stopped) = tokio::join!(dag.start(&opts), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        dag.stop_node(ia).await
    });
    outcome.unwrap();
    stopped.unwrap();

    let node = dag.node(ia).unwrap();
    assert!(node.stopped());
    assert!(!node.finished());
    assert_eq!(node.attempts(), 1);
    assert_eq!(a.state().run_state, RunState::Stopped);
    assert_eq!(b.call_count(), 0);
    assert!(dag.failures().is_empty());
}

#[tokio::test]
async fn node_stopped_before_start_never_runs() {
    let a = Arc::new(MockTask::returning("A", json!(1)));
    let b = Arc::new(MockTask::returning("B", json!(null)));
    let mut dag = Dag::new("stop-early");
    let (ia, ib) = (add(&mut dag, &a), add(&mut dag, &b));
    dag.add_dependency(ib, ia).unwrap();

    dag.stop_node(ia).await.unwrap();
    dag.start(&RunOptions::default()).await.unwrap();

    assert_eq!(a.prepare_count(), 0);
    assert_eq!(a.call_count(), 0);
    assert_eq!(a.state().run_state, RunState::Stopped);
    assert!(!dag.node(ia).unwrap().finished());
    assert_eq!(b.call_count(), 0);
}

#[tokio::test]
async fn stopped_dependent_is_skipped_by_fan_out() {
    let a = Arc::new(MockTask::returning("A", json!(1)));
    let b = Arc::new(MockTask::returning("B", json!(null)));
    let mut dag = Dag::new("stop-dependent");
    let (ia, ib) = (add(&mut dag, &a), add(&mut dag, &b));
    dag.add_dependency(ib, ia).unwrap();

    dag.stop_node(ib).await.unwrap();
    dag.start(&RunOptions::default()).await.unwrap();

    assert!(dag.node(ia).unwrap().finished());
    assert_eq!(b.prepare_count(), 0);
    assert_eq!(b.call_count(), 0);
    assert!(!dag.node(ib).unwrap().finished());
}

#[tokio::test]
async fn dispatched_node_cannot_be_run_again() {
    let a = Arc::new(MockTask::returning("A", json!(1)));
    let mut dag = Dag::new("once");
    let ia = add(&mut dag, &a);

    dag.run_node(ia, None, &RunOptions::default()).await.unwrap();
    assert_eq!(
        dag.run_node(ia, None, &RunOptions::default()).await,
        Err(EngineError::AlreadyDispatched { node_id: ia })
    );
    assert_eq!(a.call_count(), 1);
}

// ============================================================
// Observation
// ============================================================

#[tokio::test(start_paused = true)]
async fn updates_reach_callbacks_and_subscribers() {
    let a = Arc::new(MockTask::returning("A", json!(1)));
    let b = Arc::new(MockTask::returning("B", json!(2)));
    let mut dag = Dag::new("observed");
    let (ia, ib) = (add(&mut dag, &a), add(&mut dag, &b));
    dag.add_dependency(ib, ia).unwrap();

    let seen: Arc<Mutex<Vec<NodeUpdate>>> = Arc::default();
    let s = seen.clone();
    dag.on_update(Arc::new(move |u: &NodeUpdate| s.lock().unwrap().push(u.clone())));
    let mut rx = dag.subscribe();

    dag.start(&RunOptions::default()).await.unwrap();

    let seen = seen.lock().unwrap();
    let completed = |id: NodeId| {
        seen.iter()
            .any(|u| u.node_id == id && u.state.run_state == RunState::Completed)
    };
    assert!(completed(ia));
    assert!(completed(ib));

    let mut received = 0;
    while rx.try_recv().is_ok() {
        received += 1;
    }
    assert_eq!(received, seen.len());
}

#[tokio::test(start_paused = true)]
async fn snapshot_reflects_finished_run() {
    let a = Arc::new(MockTask::returning("A", json!(1)));
    let b = Arc::new(MockTask::returning("B", json!(2)));
    let mut dag = Dag::new("snapshot");
    let (ia, ib) = (add(&mut dag, &a), add(&mut dag, &b));
    dag.add_dependency(ib, ia).unwrap();

    dag.start(&RunOptions::default()).await.unwrap();

    let snapshot = dag.serialize().unwrap();
    assert_eq!(snapshot.status.run_state, RunState::Completed);
    assert_eq!(snapshot.status.status, TaskStatus::Accepted);
    let ids: Vec<NodeId> = snapshot.nodes.iter().map(|n| n.id).collect();
    assert_eq!(ids, vec![ia, ib]);
    assert!(snapshot.nodes.iter().all(|n| n.finished && !n.stopped));

    let json: Value = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(json["status"]["runState"], "Completed");
    assert_eq!(json["nodes"][1]["task"]["state"]["status"], "Accepted");
    assert_eq!(json, serde_json::to_value(dag.serialize().unwrap()).unwrap());
}

#[tokio::test(start_paused = true)]
async fn snapshot_shows_partial_failure() {
    let a = Arc::new(MockTask::returning("A", json!(1)));
    let b = Arc::new(MockTask::always_failing("B", "rejected proof"));
    let mut dag = Dag::new("partial");
    let (ia, ib) = (add(&mut dag, &a), add(&mut dag, &b));
    dag.add_dependency(ib, ia).unwrap();

    assert!(dag.start(&RunOptions::default()).await.is_err());

    let snapshot = dag.serialize().unwrap();
    assert_eq!(snapshot.status.run_state, RunState::Failed);
    assert_eq!(snapshot.status.status, TaskStatus::Failed);
    let failed = &snapshot.nodes[1];
    assert_eq!(failed.id, ib);
    assert_eq!(failed.task["state"]["errors"][0], "task failed: rejected proof");
}
