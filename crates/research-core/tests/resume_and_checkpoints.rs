//! Suspension, resumption, recovery, streaming and cancellation

mod common;

use async_trait::async_trait;
use futures::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{runner, runner_with_store, test_config, Agent, MockSearch, ScriptedProvider};
use research_core::checkpoint::{Checkpoint, Checkpointer, FileCheckpointer, MemoryCheckpointer};
use research_core::CheckpointError;
use research_core::graph::{NodeName, RunEvent};
use research_core::state::{StepStatus, WorkflowState};
use research_core::{Feedback, RunOutcome, WorkflowError};

const QUERY: &str = "What is the capital of France?";

fn final_state(outcome: RunOutcome) -> WorkflowState {
    match outcome {
        RunOutcome::Completed { state, .. } => state,
        RunOutcome::Suspended { interrupt, .. } => panic!("unexpected suspension: {:?}", interrupt),
    }
}

#[tokio::test]
async fn test_resume_from_identical_checkpoint_is_deterministic() {
    let origin = Arc::new(MemoryCheckpointer::new());
    let runner_a = runner_with_store(Arc::new(ScriptedProvider::new()), MockSearch::new(), origin.clone());

    let config = test_config().with_auto_accept_plan(false);
    let outcome = runner_a.run_with_id("run-1", QUERY, config).await.unwrap();
    assert!(!outcome.is_completed());

    // Copy the suspended checkpoint into an unrelated store
    let checkpoint = origin.load("run-1").await.unwrap().unwrap();
    let copy = Arc::new(MemoryCheckpointer::new());
    copy.save(&checkpoint).await.unwrap();
    let runner_b = runner_with_store(Arc::new(ScriptedProvider::new()), MockSearch::new(), copy);

    let a = runner_a.resume("run-1", Feedback::Approve).await.unwrap();
    let b = runner_b.resume("run-1", Feedback::Approve).await.unwrap();

    assert_eq!(a.path(), b.path());
    assert_eq!(final_state(a), final_state(b));
}

#[tokio::test]
async fn test_resume_rules() {
    let runner = runner(Arc::new(ScriptedProvider::new()), MockSearch::new());

    let err = runner.resume("missing", Feedback::Approve).await.unwrap_err();
    assert!(matches!(err, WorkflowError::RunNotFound(_)));

    let config = test_config().with_auto_accept_plan(false);
    let run_id = runner.run(QUERY, config).await.unwrap().run_id().to_string();

    let err = runner.resume(&run_id, Feedback::Answer("Paris".into())).await.unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidFeedback { .. }));

    final_state(runner.resume(&run_id, Feedback::Approve).await.unwrap());

    let err = runner.resume(&run_id, Feedback::Approve).await.unwrap_err();
    assert!(matches!(err, WorkflowError::NotSuspended(_)));
}

/// Memory store whose loads finish in reverse order of arrival
struct SlowLoads {
    inner: MemoryCheckpointer,
    loads: AtomicUsize,
}

#[async_trait]
impl Checkpointer for SlowLoads {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        self.inner.save(checkpoint).await
    }

    async fn load(&self, run_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        let loaded = self.inner.load(run_id).await?;
        let delay = match self.loads.fetch_add(1, Ordering::SeqCst) {
            0 => 10,
            _ => 100,
        };
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Ok(loaded)
    }

    async fn list(&self, run_id: &str) -> Result<Vec<usize>, CheckpointError> {
        self.inner.list(run_id).await
    }

    async fn list_runs(&self) -> Result<Vec<String>, CheckpointError> {
        self.inner.list_runs().await
    }

    async fn delete(&self, run_id: &str) -> Result<(), CheckpointError> {
        self.inner.delete(run_id).await
    }
}

#[tokio::test]
async fn test_concurrent_resumes_drive_the_run_once() {
    let store = Arc::new(MemoryCheckpointer::new());
    let provider = Arc::new(ScriptedProvider::new());
    let setup = runner_with_store(provider.clone(), MockSearch::new(), store.clone());
    let config = test_config().with_auto_accept_plan(false);
    setup.run_with_id("run-1", QUERY, config).await.unwrap();

    let suspended = store.load("run-1").await.unwrap().unwrap();
    let slow = Arc::new(SlowLoads {
        inner: MemoryCheckpointer::new(),
        loads: AtomicUsize::new(0),
    });
    slow.save(&suspended).await.unwrap();
    let runner = runner_with_store(provider.clone(), MockSearch::new(), slow);

    let (a, b) = tokio::join!(
        runner.resume("run-1", Feedback::Approve),
        runner.resume("run-1", Feedback::Approve)
    );

    let completed = [&a, &b].iter().filter(|r| matches!(r, Ok(o) if o.is_completed())).count();
    assert_eq!(completed, 1);
    let rejected = [a, b].into_iter().find_map(Result::err).unwrap();
    assert!(matches!(
        rejected,
        WorkflowError::RunInProgress(_) | WorkflowError::NotSuspended(_)
    ));
    assert_eq!(provider.calls(Agent::Reporter), 1);

    // A late resume finds the finished run
    let err = runner.resume("run-1", Feedback::Approve).await.unwrap_err();
    assert!(matches!(err, WorkflowError::NotSuspended(_)));
}

#[tokio::test]
async fn test_run_id_cannot_be_reused() {
    let runner = runner(Arc::new(ScriptedProvider::new()), MockSearch::new());
    final_state(runner.run_with_id("run-1", QUERY, test_config()).await.unwrap());

    let err = runner.run_with_id("run-1", QUERY, test_config()).await.unwrap_err();
    assert!(matches!(err, WorkflowError::Config(_)));
}

#[tokio::test]
async fn test_state_invariants_hold_after_a_full_run() {
    let store = Arc::new(MemoryCheckpointer::new());
    let runner = runner_with_store(Arc::new(ScriptedProvider::new()), MockSearch::new(), store.clone());

    let outcome = runner.run_with_id("run-1", QUERY, test_config()).await.unwrap();
    let path = outcome.path().to_vec();
    let state = final_state(outcome);
    let plan = state.current_plan.plan().unwrap();

    // Every step reached a terminal status exactly once, in list order
    assert!(plan.steps.iter().all(|s| s.status.is_terminal()));
    let executors = path
        .iter()
        .filter(|n| matches!(n, NodeName::Researcher | NodeName::Coder))
        .count();
    assert_eq!(executors, plan.steps.len());
    let step_observations: Vec<&String> = state
        .observations
        .iter()
        .filter(|o| o.starts_with("Findings") || o.starts_with("Computed"))
        .collect();
    for (step, observation) in plan.steps.iter().zip(step_observations) {
        assert_eq!(step.execution_result.as_ref(), Some(observation));
    }

    assert_eq!(path.iter().filter(|n| **n == NodeName::Reporter).count(), 1);
    assert!(state.plan_iterations <= test_config().max_plan_iterations);
    assert!(state.final_report.is_some());

    // One checkpoint per executed node
    let sequences = store.list("run-1").await.unwrap();
    assert_eq!(sequences, (1..=path.len()).collect::<Vec<_>>());
    let last = store.load("run-1").await.unwrap().unwrap();
    assert_eq!(last.next_node, NodeName::End);
    assert_eq!(last.path, path);
}

#[tokio::test]
async fn test_recursion_limit_aborts_the_run() {
    let runner = runner(Arc::new(ScriptedProvider::new()), MockSearch::new());
    let err = runner
        .run(QUERY, test_config().with_recursion_limit(4))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::RecursionLimit { limit: 4, .. }));
}

#[tokio::test]
async fn test_stream_yields_one_event_per_node() {
    let runner = runner(Arc::new(ScriptedProvider::new()), MockSearch::new());
    let stream = runner.stream(QUERY, test_config()).await.unwrap();
    let run_id = stream.run_id().to_string();

    let events: Vec<RunEvent> = stream.map(|e| e.unwrap()).collect().await;
    let steps: Vec<NodeName> = events
        .iter()
        .filter_map(|e| match e {
            RunEvent::Step { node, .. } => Some(*node),
            _ => None,
        })
        .collect();

    let checkpoint = runner.checkpoint(&run_id).await.unwrap().unwrap();
    assert_eq!(steps, checkpoint.path);
    match events.last() {
        Some(RunEvent::Finished(state)) => assert!(state.final_report.is_some()),
        other => panic!("expected finished event, got {:?}", other),
    }
}

#[tokio::test]
async fn test_resume_stream_reports_suspension_then_completion() {
    let runner = runner(Arc::new(ScriptedProvider::new()), MockSearch::new());
    let config = test_config().with_auto_accept_plan(false);

    let stream = runner.stream(QUERY, config).await.unwrap();
    let run_id = stream.run_id().to_string();
    let events: Vec<RunEvent> = stream.map(|e| e.unwrap()).collect().await;
    let Some(RunEvent::Suspended { node, .. }) = events.last() else {
        panic!("expected suspension event");
    };
    assert_eq!(*node, NodeName::HumanFeedback);

    let events: Vec<RunEvent> = runner
        .resume_stream(&run_id, Feedback::Approve)
        .await
        .unwrap()
        .map(|e| e.unwrap())
        .collect()
        .await;
    assert!(matches!(
        events.first(),
        Some(RunEvent::Step { node: NodeName::HumanFeedback, .. })
    ));
    assert!(matches!(events.last(), Some(RunEvent::Finished(_))));
}

#[tokio::test]
async fn test_cancel_stops_at_node_boundary_and_discards_checkpoint() {
    let runner = runner(Arc::new(ScriptedProvider::new()), MockSearch::new());
    let mut stream = runner.stream(QUERY, test_config()).await.unwrap();
    let run_id = stream.run_id().to_string();

    let first = stream.next().await.unwrap().unwrap();
    assert!(matches!(first, RunEvent::Step { node: NodeName::Coordinator, .. }));
    assert!(runner.cancel(&run_id).await.unwrap());

    let mut cancelled = false;
    while let Some(event) = stream.next().await {
        match event {
            Err(WorkflowError::Cancelled(id)) => {
                assert_eq!(id, run_id);
                cancelled = true;
            }
            Ok(RunEvent::Finished(_)) => panic!("cancelled run must not finish"),
            _ => {}
        }
    }
    assert!(cancelled);
    assert!(runner.checkpoint(&run_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_cancel_discards_a_suspended_run() {
    let runner = runner(Arc::new(ScriptedProvider::new()), MockSearch::new());
    let config = test_config().with_auto_accept_plan(false);
    let run_id = runner.run(QUERY, config).await.unwrap().run_id().to_string();

    assert!(runner.cancel(&run_id).await.unwrap());
    let err = runner.resume(&run_id, Feedback::Approve).await.unwrap_err();
    assert!(matches!(err, WorkflowError::RunNotFound(_)));
}

#[tokio::test]
async fn test_recover_continues_from_latest_checkpoint() {
    let store = Arc::new(MemoryCheckpointer::new());
    let provider = Arc::new(ScriptedProvider::new());
    let runner = runner_with_store(provider.clone(), MockSearch::new(), store.clone());

    // A process that stopped right after the coordinator
    let mut state = WorkflowState::new(QUERY, "en-US", true);
    state.clarified_research_topic = "Capital city of France".to_string();
    let checkpoint = Checkpoint::new("run-crashed", 1, NodeName::Planner, state, test_config())
        .with_path(vec![NodeName::Coordinator]);
    store.save(&checkpoint).await.unwrap();

    let outcome = runner.recover("run-crashed").await.unwrap();
    assert_eq!(outcome.path()[0], NodeName::Coordinator);
    assert_eq!(outcome.path()[1], NodeName::Planner);
    assert_eq!(provider.calls(common::Agent::Coordinator), 0);
    let state = final_state(outcome);
    assert!(state.final_report.unwrap().contains("Capital city of France"));
}

#[tokio::test]
async fn test_recover_leaves_suspended_runs_waiting() {
    let runner = runner(Arc::new(ScriptedProvider::new()), MockSearch::new());
    let config = test_config().with_auto_accept_plan(false);
    let run_id = runner.run(QUERY, config).await.unwrap().run_id().to_string();

    let outcome = runner.recover(&run_id).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Suspended { .. }));
    let err = runner.recover("missing").await.unwrap_err();
    assert!(matches!(err, WorkflowError::RunNotFound(_)));
}

#[tokio::test]
async fn test_file_checkpoints_survive_a_new_runner() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config().with_auto_accept_plan(false);

    let run_id = {
        let store = Arc::new(FileCheckpointer::new(dir.path(), true));
        let runner = runner_with_store(Arc::new(ScriptedProvider::new()), MockSearch::new(), store);
        runner.run(QUERY, config).await.unwrap().run_id().to_string()
    };

    let store = Arc::new(FileCheckpointer::new(dir.path(), true));
    let runner = runner_with_store(Arc::new(ScriptedProvider::new()), MockSearch::new(), store);
    let state = final_state(runner.resume(&run_id, Feedback::Approve).await.unwrap());

    let plan = state.current_plan.plan().unwrap();
    assert!(plan.steps.iter().all(|s| s.status == StepStatus::Completed));
    assert!(state.plan_approved);
}
