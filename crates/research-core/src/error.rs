//! Error types for the research workflow
//!
//! Errors are layered the same way failures are handled:
//! - [`LlmError`] / [`ToolError`]: raised by capability providers
//! - [`AgentError`]: caught at the node boundary and turned into a failed step
//! - [`WorkflowError`]: fatal, aborts the run and carries the run identifier

use thiserror::Error;

use crate::graph::NodeName;
use crate::state::StepStatus;
use crate::tools::ToolInterrupt;

/// Failure reported by an LLM capability provider
#[derive(Debug, Error)]
pub enum LlmError {
    /// Timeout, rate limit or connection reset. Safe to retry.
    #[error("Transient provider error: {0}")]
    Transient(String),

    /// The model answered but the answer could not be used
    #[error("Malformed model output: {0}")]
    MalformedOutput(String),

    /// Any other provider failure (auth, bad request, ...)
    #[error("Provider error: {0}")]
    Provider(String),
}

impl LlmError {
    pub fn is_transient(&self) -> bool {
        matches!(self, LlmError::Transient(_))
    }
}

/// Failure reported by a tool invocation
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Transient tool failure: {0}")]
    Transient(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool execution failed: {0}")]
    Execution(String),

    /// Raised by the interceptor before a guarded tool runs
    #[error("Tool '{}' requires approval before execution", .0.tool_name)]
    Interrupted(ToolInterrupt),
}

impl ToolError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ToolError::Transient(_))
    }
}

impl From<serde_json::Error> for ToolError {
    fn from(e: serde_json::Error) -> Self {
        ToolError::InvalidArguments(e.to_string())
    }
}

/// Node-level agent failure
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("Tool '{tool}' failed: {source}")]
    Tool {
        tool: String,
        #[source]
        source: ToolError,
    },

    #[error("Agent exceeded {0} reasoning iterations")]
    MaxIterations(usize),

    #[error("Agent invocation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Suspension signal from an intercepted tool. Not a failure.
    #[error("Execution interrupted before tool '{}'", .0.tool_name)]
    Interrupted(ToolInterrupt),

    #[error("Agent configuration error: {0}")]
    Configuration(String),
}

impl AgentError {
    /// Build the error for a failed tool call, lifting interrupts out of the tool layer
    pub fn from_tool(tool: impl Into<String>, source: ToolError) -> Self {
        match source {
            ToolError::Interrupted(interrupt) => AgentError::Interrupted(interrupt),
            source => AgentError::Tool {
                tool: tool.into(),
                source,
            },
        }
    }

    /// Whether a retry at the node boundary may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            AgentError::Llm(e) => e.is_transient(),
            AgentError::Tool { source, .. } => source.is_transient(),
            AgentError::Timeout(_) => true,
            _ => false,
        }
    }

    pub fn interrupt(&self) -> Option<&ToolInterrupt> {
        match self {
            AgentError::Interrupted(interrupt) => Some(interrupt),
            _ => None,
        }
    }
}

/// A state delta that would break a state invariant
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("Final report is already set")]
    FinalReportAlreadySet,

    #[error("Step {index}: cannot move from {from} to {to}")]
    InvalidStepTransition {
        index: usize,
        from: StepStatus,
        to: StepStatus,
    },

    #[error("Step index {0} is out of range")]
    StepOutOfRange(usize),

    #[error("No structured plan to update")]
    NoStructuredPlan,
}

/// Errors raised by checkpoint stores
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Corrupted checkpoint: {0}")]
    Corrupted(String),

    #[error("Invalid run id: {0:?}")]
    InvalidRunId(String),
}

/// Fatal workflow error surfaced to the caller
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Run {run_id}: state invariant violated: {message}")]
    InvariantViolation { run_id: String, message: String },

    #[error("Run {run_id}: checkpoint failure: {source}")]
    Checkpoint {
        run_id: String,
        #[source]
        source: CheckpointError,
    },

    #[error("Run {run_id}: no transition out of {from}")]
    NoTransition { run_id: String, from: NodeName },

    #[error("Run {run_id}: node {node} failed: {source}")]
    Node {
        run_id: String,
        node: NodeName,
        #[source]
        source: AgentError,
    },

    #[error("Run {run_id}: exceeded {limit} node transitions")]
    RecursionLimit { run_id: String, limit: usize },

    #[error("Run {0} was cancelled")]
    Cancelled(String),

    #[error("Run {0} not found")]
    RunNotFound(String),

    #[error("Run {0} is not suspended")]
    NotSuspended(String),

    #[error("Run {run_id}: {message}")]
    InvalidFeedback { run_id: String, message: String },

    #[error("Run {0} is already being executed")]
    RunInProgress(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl WorkflowError {
    pub fn invariant(run_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvariantViolation {
            run_id: run_id.into(),
            message: message.into(),
        }
    }

    pub fn checkpoint(run_id: impl Into<String>, source: CheckpointError) -> Self {
        Self::Checkpoint {
            run_id: run_id.into(),
            source,
        }
    }

    pub fn node(run_id: impl Into<String>, node: NodeName, source: AgentError) -> Self {
        Self::Node {
            run_id: run_id.into(),
            node,
            source,
        }
    }

    /// Run identifier the error belongs to, if any
    pub fn run_id(&self) -> Option<&str> {
        match self {
            Self::InvariantViolation { run_id, .. }
            | Self::Checkpoint { run_id, .. }
            | Self::NoTransition { run_id, .. }
            | Self::Node { run_id, .. }
            | Self::RecursionLimit { run_id, .. }
            | Self::InvalidFeedback { run_id, .. } => Some(run_id),
            Self::Cancelled(run_id)
            | Self::RunNotFound(run_id)
            | Self::NotSuspended(run_id)
            | Self::RunInProgress(run_id) => Some(run_id),
            Self::Config(_) => None,
        }
    }
}
