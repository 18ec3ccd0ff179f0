//! Run checkpoints
//!
//! A checkpoint is written after every node and at every suspension. It
//! captures everything needed to continue a run: the state, the node to run
//! next, the run configuration, and the interrupt awaiting input (if any).
//!
//! # Usage
//!
//! ```ignore
//! use research_core::checkpoint::{create_checkpointer, CheckpointerConfig};
//!
//! let checkpointer = create_checkpointer(CheckpointerConfig::File {
//!     path: PathBuf::from("./checkpoints"),
//!     compression: true,
//! });
//!
//! if let Some(checkpoint) = checkpointer.load("run-123").await? {
//!     // continue from checkpoint.next_node
//! }
//! ```

mod file;

pub use file::FileCheckpointer;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::RunConfig;
use crate::error::CheckpointError;
use crate::graph::NodeName;
use crate::state::{Plan, PlanSlot, WorkflowState};
use crate::tools::ToolInterrupt;

/// Why a run is waiting for external input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Interrupt {
    /// The planner produced a plan that needs approval
    PlanReview { plan: PlanSlot },
    /// The coordinator needs the user to clarify the request
    Clarification { question: String },
    /// An intercepted tool call needs approval
    ToolApproval(ToolInterrupt),
}

impl Interrupt {
    pub fn plan_review(plan: Plan) -> Self {
        Interrupt::PlanReview {
            plan: PlanSlot::Structured(plan),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Interrupt::PlanReview { .. } => "plan_review",
            Interrupt::Clarification { .. } => "clarification",
            Interrupt::ToolApproval(_) => "tool_approval",
        }
    }

    /// Text shown to whoever must answer the interrupt
    pub fn prompt(&self) -> String {
        match self {
            Interrupt::PlanReview { plan } => match plan {
                PlanSlot::Structured(plan) => {
                    let mut text = format!("Please review the plan: {}\n", plan.title);
                    for (i, step) in plan.steps.iter().enumerate() {
                        text.push_str(&format!("  {}. {} - {}\n", i + 1, step.title, step.description));
                    }
                    text
                }
                PlanSlot::Draft(raw) => format!("Please review the plan draft:\n{}", raw),
                PlanSlot::Unset => "Please review the plan.".to_string(),
            },
            Interrupt::Clarification { question } => question.clone(),
            Interrupt::ToolApproval(interrupt) => interrupt.description.clone(),
        }
    }

    /// Whether `feedback` is a valid answer to this interrupt
    pub fn accepts(&self, feedback: &Feedback) -> bool {
        match self {
            Interrupt::PlanReview { .. } => !matches!(feedback, Feedback::Answer(_)),
            Interrupt::Clarification { .. } => matches!(feedback, Feedback::Answer(_)),
            Interrupt::ToolApproval(_) => matches!(feedback, Feedback::Approve | Feedback::Reject(_)),
        }
    }
}

/// External input that resumes a suspended run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "text", rename_all = "snake_case")]
pub enum Feedback {
    Approve,
    /// Revise the plan with these instructions
    Edit(String),
    /// Refuse the plan or tool call, with a reason
    Reject(String),
    /// Answer to a clarification question
    Answer(String),
}

impl Feedback {
    pub fn kind(&self) -> &'static str {
        match self {
            Feedback::Approve => "approve",
            Feedback::Edit(_) => "edit",
            Feedback::Reject(_) => "reject",
            Feedback::Answer(_) => "answer",
        }
    }
}

/// Persisted snapshot of a run at a node boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub run_id: String,
    /// Monotonic per run
    pub sequence: usize,
    /// Node to execute when the run continues
    pub next_node: NodeName,
    pub state: WorkflowState,
    pub config: RunConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interrupt: Option<Interrupt>,
    /// Nodes executed so far, in order
    #[serde(default)]
    pub path: Vec<NodeName>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Checkpoint {
    pub fn new(
        run_id: impl Into<String>,
        sequence: usize,
        next_node: NodeName,
        state: WorkflowState,
        config: RunConfig,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            sequence,
            next_node,
            state,
            config,
            interrupt: None,
            path: Vec::new(),
            created_at: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = Some(interrupt);
        self
    }

    pub fn with_path(mut self, path: Vec<NodeName>) -> Self {
        self.path = path;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn is_suspended(&self) -> bool {
        self.interrupt.is_some()
    }
}

/// Checkpoint store shared by all runs, isolated by run id
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Implementations must not leave a partially written checkpoint behind
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError>;

    /// Latest checkpoint of a run
    async fn load(&self, run_id: &str) -> Result<Option<Checkpoint>, CheckpointError>;

    /// Sequence numbers stored for a run, ascending
    async fn list(&self, run_id: &str) -> Result<Vec<usize>, CheckpointError>;

    /// Run ids with at least one checkpoint, sorted
    async fn list_runs(&self) -> Result<Vec<String>, CheckpointError>;

    /// Remove every checkpoint of a run
    async fn delete(&self, run_id: &str) -> Result<(), CheckpointError>;

    async fn exists(&self, run_id: &str) -> Result<bool, CheckpointError> {
        Ok(!self.list(run_id).await?.is_empty())
    }
}

pub type DynCheckpointer = Arc<dyn Checkpointer>;

/// Checkpoint store selection
#[derive(Debug, Clone, Default)]
pub enum CheckpointerConfig {
    /// In-memory (not durable)
    #[default]
    Memory,

    File {
        /// Directory holding one subdirectory per run
        path: PathBuf,
        /// Compress checkpoint data with zstd
        compression: bool,
    },
}

pub fn create_checkpointer(config: CheckpointerConfig) -> DynCheckpointer {
    match config {
        CheckpointerConfig::Memory => Arc::new(MemoryCheckpointer::new()),
        CheckpointerConfig::File { path, compression } => Arc::new(FileCheckpointer::new(path, compression)),
    }
}

/// In-memory checkpointer for tests and single-process use
#[derive(Debug, Default)]
pub struct MemoryCheckpointer {
    runs: RwLock<HashMap<String, BTreeMap<usize, Checkpoint>>>,
}

impl MemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Checkpointer for MemoryCheckpointer {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let mut runs = self.runs.write().await;
        runs.entry(checkpoint.run_id.clone())
            .or_default()
            .insert(checkpoint.sequence, checkpoint.clone());
        Ok(())
    }

    async fn load(&self, run_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        let runs = self.runs.read().await;
        Ok(runs
            .get(run_id)
            .and_then(|history| history.values().next_back().cloned()))
    }

    async fn list(&self, run_id: &str) -> Result<Vec<usize>, CheckpointError> {
        let runs = self.runs.read().await;
        Ok(runs
            .get(run_id)
            .map(|history| history.keys().copied().collect())
            .unwrap_or_default())
    }

    async fn list_runs(&self) -> Result<Vec<String>, CheckpointError> {
        let runs = self.runs.read().await;
        let mut ids: Vec<String> = runs.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    async fn delete(&self, run_id: &str) -> Result<(), CheckpointError> {
        self.runs.write().await.remove(run_id);
        Ok(())
    }
}
