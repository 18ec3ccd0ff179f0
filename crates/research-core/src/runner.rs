//! Public entry point for research runs
//!
//! [`WorkflowRunner`] owns the graph engine and the checkpoint store. It
//! starts runs, streams their progress, resumes suspended runs with
//! external feedback and cancels runs at node boundaries.
//!
//! ```rust,ignore
//! let runner = WorkflowRunner::builder()
//!     .providers(ProviderRegistry::single(provider))
//!     .search_tool(Arc::new(TavilySearchTool::from_env()?))
//!     .build()?;
//!
//! match runner.run("What is the capital of France?", RunConfig::default()).await? {
//!     RunOutcome::Completed { state, .. } => println!("{}", state.final_report.unwrap_or_default()),
//!     RunOutcome::Suspended { run_id, interrupt, .. } => {
//!         println!("{}", interrupt.prompt());
//!         runner.resume(&run_id, Feedback::Approve).await?;
//!     }
//! }
//! ```

use futures::Stream;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::agents::AgentFactory;
use crate::checkpoint::{create_checkpointer, Checkpoint, CheckpointerConfig, DynCheckpointer, Feedback, Interrupt};
use crate::config::RunConfig;
use crate::error::WorkflowError;
use crate::graph::{EngineOutcome, Execution, GraphEngine, NodeName, RunEvent, TransitionTable};
use crate::llm::{CapabilityMap, LLMConfig, ProviderRegistry};
use crate::nodes::research_nodes;
use crate::state::{Message, WorkflowState};
use crate::tools::{DynTool, ReviewLedger, ToolDecision, ToolSet};

/// How a call into the runner ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed {
        run_id: String,
        state: WorkflowState,
        path: Vec<NodeName>,
    },
    Suspended {
        run_id: String,
        interrupt: Interrupt,
        state: WorkflowState,
        path: Vec<NodeName>,
    },
}

impl RunOutcome {
    fn from_engine(run_id: String, outcome: EngineOutcome) -> Self {
        match outcome {
            EngineOutcome::Completed { state, path } => RunOutcome::Completed { run_id, state, path },
            EngineOutcome::Suspended { state, interrupt, path } => RunOutcome::Suspended {
                run_id,
                interrupt,
                state,
                path,
            },
        }
    }

    pub fn run_id(&self) -> &str {
        match self {
            RunOutcome::Completed { run_id, .. } | RunOutcome::Suspended { run_id, .. } => run_id,
        }
    }

    pub fn state(&self) -> &WorkflowState {
        match self {
            RunOutcome::Completed { state, .. } | RunOutcome::Suspended { state, .. } => state,
        }
    }

    pub fn path(&self) -> &[NodeName] {
        match self {
            RunOutcome::Completed { path, .. } | RunOutcome::Suspended { path, .. } => path,
        }
    }

    pub fn interrupt(&self) -> Option<&Interrupt> {
        match self {
            RunOutcome::Suspended { interrupt, .. } => Some(interrupt),
            RunOutcome::Completed { .. } => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed { .. })
    }
}

/// Progress events of one run.
///
/// Backed by a capacity-one channel: the driver never runs more than one
/// node ahead of the consumer. Dropping the stream does not stop the run.
pub struct RunStream {
    run_id: String,
    inner: Pin<Box<dyn Stream<Item = Result<RunEvent, WorkflowError>> + Send>>,
}

impl RunStream {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }
}

impl Stream for RunStream {
    type Item = Result<RunEvent, WorkflowError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

type ActiveRuns = Arc<Mutex<HashMap<String, CancellationToken>>>;

/// Exclusive claim on a run id; released when dropped
struct ActiveRun {
    run_id: String,
    cancel: CancellationToken,
    active: ActiveRuns,
}

impl ActiveRun {
    fn bind(&self, exec: Execution) -> Execution {
        exec.with_cancellation(self.cancel.clone())
    }
}

impl Drop for ActiveRun {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.run_id);
    }
}

pub struct WorkflowRunner {
    engine: Arc<GraphEngine>,
    checkpointer: DynCheckpointer,
    active: ActiveRuns,
}

impl WorkflowRunner {
    pub fn builder() -> WorkflowRunnerBuilder {
        WorkflowRunnerBuilder::default()
    }

    pub fn engine(&self) -> &GraphEngine {
        &self.engine
    }

    /// Start a run with a generated id and drive it to completion or suspension
    pub async fn run(&self, query: &str, config: RunConfig) -> Result<RunOutcome, WorkflowError> {
        self.run_with_id(&Uuid::new_v4().to_string(), query, config).await
    }

    pub async fn run_with_id(&self, run_id: &str, query: &str, config: RunConfig) -> Result<RunOutcome, WorkflowError> {
        let claim = self.claim(run_id)?;
        let exec = self.start(run_id, query, config).await?;
        self.drive(exec, claim).await
    }

    /// Start a run and stream its progress
    pub async fn stream(&self, query: &str, config: RunConfig) -> Result<RunStream, WorkflowError> {
        let run_id = Uuid::new_v4().to_string();
        let claim = self.claim(&run_id)?;
        let exec = self.start(&run_id, query, config).await?;
        Ok(self.spawn_stream(exec, claim))
    }

    /// Continue a suspended run with external input
    pub async fn resume(&self, run_id: &str, feedback: Feedback) -> Result<RunOutcome, WorkflowError> {
        let claim = self.claim(run_id)?;
        let exec = self.resumption(run_id, feedback).await?;
        self.drive(exec, claim).await
    }

    pub async fn resume_stream(&self, run_id: &str, feedback: Feedback) -> Result<RunStream, WorkflowError> {
        let claim = self.claim(run_id)?;
        let exec = self.resumption(run_id, feedback).await?;
        Ok(self.spawn_stream(exec, claim))
    }

    /// Continue an interrupted-by-crash run from its latest checkpoint.
    ///
    /// A run waiting for feedback is returned as suspended without running
    /// anything; use [`resume`](Self::resume) to answer it.
    pub async fn recover(&self, run_id: &str) -> Result<RunOutcome, WorkflowError> {
        let claim = self.claim(run_id)?;
        let checkpoint = self.latest(run_id).await?;

        if let Some(interrupt) = checkpoint.interrupt {
            return Ok(RunOutcome::Suspended {
                run_id: checkpoint.run_id,
                interrupt,
                state: checkpoint.state,
                path: checkpoint.path,
            });
        }

        info!(run_id, sequence = checkpoint.sequence, next = %checkpoint.next_node, "Recovering run");
        self.drive(Execution::from_checkpoint(checkpoint, None), claim).await
    }

    /// Cancel a run.
    ///
    /// A run being driven stops at its next node boundary; a suspended run
    /// has its checkpoints discarded. Returns false when the run is unknown.
    pub async fn cancel(&self, run_id: &str) -> Result<bool, WorkflowError> {
        let token = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(run_id)
            .cloned();

        if let Some(token) = token {
            info!(run_id, "Cancelling active run");
            token.cancel();
            return Ok(true);
        }

        let exists = self
            .checkpointer
            .exists(run_id)
            .await
            .map_err(|e| WorkflowError::checkpoint(run_id, e))?;
        if exists {
            info!(run_id, "Discarding checkpoints of idle run");
            self.checkpointer
                .delete(run_id)
                .await
                .map_err(|e| WorkflowError::checkpoint(run_id, e))?;
        }
        Ok(exists)
    }

    /// Latest checkpoint of a run, if any
    pub async fn checkpoint(&self, run_id: &str) -> Result<Option<Checkpoint>, WorkflowError> {
        self.checkpointer
            .load(run_id)
            .await
            .map_err(|e| WorkflowError::checkpoint(run_id, e))
    }

    async fn latest(&self, run_id: &str) -> Result<Checkpoint, WorkflowError> {
        self.checkpoint(run_id)
            .await?
            .ok_or_else(|| WorkflowError::RunNotFound(run_id.to_string()))
    }

    async fn start(&self, run_id: &str, query: &str, mut config: RunConfig) -> Result<Execution, WorkflowError> {
        config.validate()?;
        if query.trim().is_empty() {
            return Err(WorkflowError::Config("query must not be empty".to_string()));
        }

        let exists = self
            .checkpointer
            .exists(run_id)
            .await
            .map_err(|e| WorkflowError::checkpoint(run_id, e))?;
        if exists {
            return Err(WorkflowError::Config(format!("run id {} already has checkpoints", run_id)));
        }

        let state = initial_state(query, &mut config);
        info!(
            run_id,
            locale = %state.locale,
            background = config.enable_background_investigation,
            auto_accept_plan = config.auto_accept_plan,
            "Starting research run"
        );
        Ok(Execution::start(run_id, state, config))
    }

    async fn resumption(&self, run_id: &str, feedback: Feedback) -> Result<Execution, WorkflowError> {
        let checkpoint = self.latest(run_id).await?;
        let interrupt = checkpoint
            .interrupt
            .clone()
            .ok_or_else(|| WorkflowError::NotSuspended(run_id.to_string()))?;

        if !interrupt.accepts(&feedback) {
            return Err(WorkflowError::InvalidFeedback {
                run_id: run_id.to_string(),
                message: format!("'{}' does not answer a {} interrupt", feedback.kind(), interrupt.kind()),
            });
        }

        let reviews = Arc::new(ReviewLedger::new());
        if let Interrupt::ToolApproval(call) = &interrupt {
            let decision = match &feedback {
                Feedback::Reject(reason) => ToolDecision::Reject { reason: reason.clone() },
                _ => ToolDecision::Approve,
            };
            reviews.record(call, decision);
        }

        info!(run_id, interrupt = interrupt.kind(), feedback = feedback.kind(), "Resuming run");
        Ok(Execution::from_checkpoint(checkpoint, Some(feedback)).with_reviews(reviews))
    }

    /// Claim a run id before its checkpoints are read.
    ///
    /// Only one start, resume or recovery of a run may hold the claim, so two
    /// callers can never drive the same suspended snapshot.
    fn claim(&self, run_id: &str) -> Result<ActiveRun, WorkflowError> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if active.contains_key(run_id) {
            return Err(WorkflowError::RunInProgress(run_id.to_string()));
        }
        let cancel = CancellationToken::new();
        active.insert(run_id.to_string(), cancel.clone());
        Ok(ActiveRun {
            run_id: run_id.to_string(),
            cancel,
            active: Arc::clone(&self.active),
        })
    }

    async fn drive(&self, exec: Execution, claim: ActiveRun) -> Result<RunOutcome, WorkflowError> {
        let exec = claim.bind(exec);
        let run_id = exec.run_id.clone();
        let outcome = self.engine.drive(exec, None).await;
        drop(claim);
        if let Err(e) = &outcome {
            warn!(run_id = %run_id, error = %e, "Run failed");
        }
        outcome.map(|o| RunOutcome::from_engine(run_id, o))
    }

    fn spawn_stream(&self, exec: Execution, claim: ActiveRun) -> RunStream {
        let exec = claim.bind(exec);
        let run_id = exec.run_id.clone();
        let engine = Arc::clone(&self.engine);
        let (tx, rx) = mpsc::channel(1);

        tokio::spawn(async move {
            let _claim = claim;
            if let Err(e) = engine.drive(exec, Some(&tx)).await {
                warn!(run_id = ?e.run_id(), error = %e, "Streamed run failed");
                let _ = tx.send(Err(e)).await;
            }
        });

        let inner = futures::stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) });
        RunStream {
            run_id,
            inner: Box::pin(inner),
        }
    }
}

/// Initial state for a run, honoring a pre-seeded state in the config
fn initial_state(query: &str, config: &mut RunConfig) -> WorkflowState {
    let Some(mut state) = config.initial_state.take() else {
        return WorkflowState::new(query, &config.locale, config.auto_accept_plan);
    };

    state.research_topic = query.to_string();
    state.clarified_research_topic = query.to_string();
    state.locale = config.locale.clone();
    state.auto_accepted_plan = config.auto_accept_plan;
    if !state.messages.iter().any(|m| m.content == query) {
        state.messages.push(Message::user(query));
    }
    state
}

/// Assembles a [`WorkflowRunner`]
pub struct WorkflowRunnerBuilder {
    capabilities: CapabilityMap,
    providers: ProviderRegistry,
    llm_config: Option<LLMConfig>,
    search_tool: Option<DynTool>,
    researcher_tools: ToolSet,
    coder_tools: ToolSet,
    checkpointer: Option<DynCheckpointer>,
    table: TransitionTable,
}

impl Default for WorkflowRunnerBuilder {
    fn default() -> Self {
        Self {
            capabilities: CapabilityMap::default(),
            providers: ProviderRegistry::new(),
            llm_config: None,
            search_tool: None,
            researcher_tools: ToolSet::new(),
            coder_tools: ToolSet::new(),
            checkpointer: None,
            table: TransitionTable::research(),
        }
    }
}

impl WorkflowRunnerBuilder {
    pub fn capabilities(mut self, capabilities: CapabilityMap) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn providers(mut self, providers: ProviderRegistry) -> Self {
        self.providers = providers;
        self
    }

    pub fn llm_config(mut self, config: LLMConfig) -> Self {
        self.llm_config = Some(config);
        self
    }

    /// Search used for background investigation; researchers get it too
    pub fn search_tool(mut self, tool: DynTool) -> Self {
        self.search_tool = Some(tool);
        self
    }

    pub fn researcher_tools(mut self, tools: ToolSet) -> Self {
        self.researcher_tools = tools;
        self
    }

    pub fn coder_tools(mut self, tools: ToolSet) -> Self {
        self.coder_tools = tools;
        self
    }

    pub fn checkpointer(mut self, checkpointer: DynCheckpointer) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }

    pub fn table(mut self, table: TransitionTable) -> Self {
        self.table = table;
        self
    }

    pub fn build(self) -> Result<WorkflowRunner, WorkflowError> {
        if self.providers.is_empty() {
            return Err(WorkflowError::Config("no LLM provider registered".to_string()));
        }

        let mut researcher_tools = self.researcher_tools;
        if let Some(search) = &self.search_tool {
            if researcher_tools.get(&search.name()).is_none() {
                researcher_tools.insert(Arc::clone(search));
            }
        }

        let mut factory = AgentFactory::new(self.capabilities, self.providers);
        if let Some(config) = self.llm_config {
            factory = factory.with_llm_config(config);
        }

        let checkpointer = self
            .checkpointer
            .unwrap_or_else(|| create_checkpointer(CheckpointerConfig::Memory));

        let engine = research_nodes(Arc::new(factory), self.search_tool, researcher_tools, self.coder_tools)
            .into_iter()
            .fold(GraphEngine::new(self.table, Arc::clone(&checkpointer)), GraphEngine::with_node);

        Ok(WorkflowRunner {
            engine: Arc::new(engine),
            checkpointer,
            active: Arc::new(Mutex::new(HashMap::new())),
        })
    }
}
