//! Sequential graph engine
//!
//! Executes one node at a time. After every node the returned delta is
//! applied with invariant checks, the next node is chosen from the
//! transition table, and a checkpoint is written. A node may instead suspend
//! the run; the engine then checkpoints the suspension and returns so the
//! caller can collect external input.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{NodeName, TransitionTable};
use crate::checkpoint::{Checkpoint, DynCheckpointer, Feedback, Interrupt};
use crate::config::RunConfig;
use crate::error::WorkflowError;
use crate::state::{StateDelta, WorkflowState};
use crate::tools::ReviewLedger;

/// What a node produced
#[derive(Debug, Clone, PartialEq)]
pub enum NodeOutput {
    Continue(StateDelta),
    /// Apply the delta, then wait for external input before running this
    /// node again
    Suspend { delta: StateDelta, interrupt: Interrupt },
}

/// Per-run values handed to every node
#[derive(Debug, Clone)]
pub struct NodeContext {
    pub run_id: String,
    pub config: Arc<RunConfig>,
    /// Resume input, present only for the first node after a resumption
    pub feedback: Option<Feedback>,
    pub reviews: Arc<ReviewLedger>,
}

#[async_trait]
pub trait Node: Send + Sync {
    fn name(&self) -> NodeName;

    /// Recoverable failures are folded into the returned delta; an `Err`
    /// aborts the run.
    async fn run(&self, state: &WorkflowState, ctx: &NodeContext) -> Result<NodeOutput, WorkflowError>;
}

pub type DynNode = Arc<dyn Node>;

/// Progress notification, one per executed node
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    Step { node: NodeName, delta: StateDelta },
    Suspended { node: NodeName, interrupt: Interrupt },
    Finished(Box<WorkflowState>),
}

pub type EventSender = mpsc::Sender<Result<RunEvent, WorkflowError>>;

/// Cursor of a run being driven
#[derive(Debug, Clone)]
pub struct Execution {
    pub run_id: String,
    pub state: WorkflowState,
    pub next: NodeName,
    pub config: Arc<RunConfig>,
    pub path: Vec<NodeName>,
    /// Sequence number of the last checkpoint written
    pub sequence: usize,
    pub feedback: Option<Feedback>,
    pub reviews: Arc<ReviewLedger>,
    pub cancel: CancellationToken,
}

impl Execution {
    pub fn start(run_id: impl Into<String>, state: WorkflowState, config: RunConfig) -> Self {
        Self {
            run_id: run_id.into(),
            state,
            next: NodeName::Coordinator,
            config: Arc::new(config),
            path: Vec::new(),
            sequence: 0,
            feedback: None,
            reviews: Arc::new(ReviewLedger::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Continue from a stored checkpoint
    pub fn from_checkpoint(checkpoint: Checkpoint, feedback: Option<Feedback>) -> Self {
        Self {
            run_id: checkpoint.run_id,
            state: checkpoint.state,
            next: checkpoint.next_node,
            config: Arc::new(checkpoint.config),
            path: checkpoint.path,
            sequence: checkpoint.sequence,
            feedback,
            reviews: Arc::new(ReviewLedger::new()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_reviews(mut self, reviews: Arc<ReviewLedger>) -> Self {
        self.reviews = reviews;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// How a drive ended
#[derive(Debug, Clone, PartialEq)]
pub enum EngineOutcome {
    Completed {
        state: WorkflowState,
        path: Vec<NodeName>,
    },
    Suspended {
        state: WorkflowState,
        interrupt: Interrupt,
        path: Vec<NodeName>,
    },
}

pub struct GraphEngine {
    table: TransitionTable,
    nodes: HashMap<NodeName, DynNode>,
    checkpointer: DynCheckpointer,
}

impl GraphEngine {
    pub fn new(table: TransitionTable, checkpointer: DynCheckpointer) -> Self {
        Self {
            table,
            nodes: HashMap::new(),
            checkpointer,
        }
    }

    pub fn with_node(mut self, node: DynNode) -> Self {
        self.nodes.insert(node.name(), node);
        self
    }

    pub fn table(&self) -> &TransitionTable {
        &self.table
    }

    pub fn checkpointer(&self) -> &DynCheckpointer {
        &self.checkpointer
    }

    /// Drive a run until it ends, suspends or fails
    pub async fn drive(
        &self,
        mut exec: Execution,
        events: Option<&EventSender>,
    ) -> Result<EngineOutcome, WorkflowError> {
        let run_id = exec.run_id.clone();

        loop {
            if exec.cancel.is_cancelled() {
                info!(run_id = %run_id, node = %exec.next, "Run cancelled at node boundary");
                self.checkpointer
                    .delete(&run_id)
                    .await
                    .map_err(|e| WorkflowError::checkpoint(&run_id, e))?;
                return Err(WorkflowError::Cancelled(run_id));
            }

            if exec.next.is_end() {
                info!(run_id = %run_id, nodes = exec.path.len(), "Run completed");
                emit(events, RunEvent::Finished(Box::new(exec.state.clone()))).await;
                return Ok(EngineOutcome::Completed {
                    state: exec.state,
                    path: exec.path,
                });
            }

            if exec.path.len() >= exec.config.recursion_limit {
                return Err(WorkflowError::RecursionLimit {
                    run_id,
                    limit: exec.config.recursion_limit,
                });
            }

            let current = exec.next;
            let node = self.nodes.get(&current).ok_or_else(|| {
                WorkflowError::invariant(&run_id, format!("no node registered for {}", current))
            })?;

            let ctx = NodeContext {
                run_id: run_id.clone(),
                config: Arc::clone(&exec.config),
                feedback: exec.feedback.take(),
                reviews: Arc::clone(&exec.reviews),
            };

            info!(run_id = %run_id, node = %current, "Executing node");
            let started = Instant::now();
            let output = node.run(&exec.state, &ctx).await?;
            debug!(run_id = %run_id, node = %current, elapsed_ms = started.elapsed().as_millis() as u64, "Node finished");

            exec.path.push(current);

            match output {
                NodeOutput::Continue(delta) => {
                    exec.state = self.apply(&run_id, &exec, delta.clone())?;
                    emit(events, RunEvent::Step { node: current, delta }).await;

                    let to = self
                        .table
                        .next(current, &exec.state, &exec.config)
                        .ok_or_else(|| WorkflowError::NoTransition {
                            run_id: run_id.clone(),
                            from: current,
                        })?;
                    debug!(run_id = %run_id, from = %current, to = %to.to, condition = to.label, "Transition");
                    exec.next = to.to;

                    self.save(&mut exec, current, None).await?;
                }
                NodeOutput::Suspend { delta, interrupt } => {
                    exec.state = self.apply(&run_id, &exec, delta)?;
                    // The suspended node runs again on resume
                    exec.next = current;
                    self.save(&mut exec, current, Some(interrupt.clone())).await?;

                    info!(run_id = %run_id, node = %current, interrupt = interrupt.kind(), "Run suspended");
                    emit(
                        events,
                        RunEvent::Suspended {
                            node: current,
                            interrupt: interrupt.clone(),
                        },
                    )
                    .await;
                    return Ok(EngineOutcome::Suspended {
                        state: exec.state,
                        interrupt,
                        path: exec.path,
                    });
                }
            }
        }
    }

    fn apply(&self, run_id: &str, exec: &Execution, delta: StateDelta) -> Result<WorkflowState, WorkflowError> {
        let next = exec
            .state
            .apply(delta)
            .map_err(|e| WorkflowError::invariant(run_id, e.to_string()))?;

        if next.plan_iterations > exec.config.max_plan_iterations {
            return Err(WorkflowError::invariant(
                run_id,
                format!(
                    "plan_iterations {} exceeds max_plan_iterations {}",
                    next.plan_iterations, exec.config.max_plan_iterations
                ),
            ));
        }
        Ok(next)
    }

    async fn save(
        &self,
        exec: &mut Execution,
        executed: NodeName,
        interrupt: Option<Interrupt>,
    ) -> Result<(), WorkflowError> {
        exec.sequence += 1;
        let mut checkpoint = Checkpoint::new(
            &exec.run_id,
            exec.sequence,
            exec.next,
            exec.state.clone(),
            exec.config.as_ref().clone(),
        )
        .with_path(exec.path.clone())
        .with_metadata("node", executed.as_str());
        if let Some(interrupt) = interrupt {
            checkpoint = checkpoint.with_interrupt(interrupt);
        }

        self.checkpointer
            .save(&checkpoint)
            .await
            .map_err(|e| WorkflowError::checkpoint(&exec.run_id, e))?;
        debug!(run_id = %exec.run_id, sequence = exec.sequence, next = %exec.next, "Checkpoint saved");
        Ok(())
    }
}

async fn emit(events: Option<&EventSender>, event: RunEvent) {
    if let Some(tx) = events {
        // A dropped receiver only stops progress reporting; the run itself
        // continues and stays checkpointed.
        if tx.send(Ok(event)).await.is_err() {
            debug!("Event receiver dropped");
        }
    }
}
