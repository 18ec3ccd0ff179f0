//! research-core: multi-agent deep research workflow engine
//!
//! A team of model-driven agents (coordinator, planner, researcher, coder,
//! reporter) is sequenced through a typed state machine:
//! - [`graph::TransitionTable`]: routing rules as data
//! - [`graph::GraphEngine`]: sequential node execution with a checkpoint
//!   after every node
//! - [`WorkflowRunner`]: run, stream, resume, recover and cancel runs
//! - [`agents::AgentFactory`]: role to capability to provider binding
//! - [`tools::intercept_tools`]: human approval before sensitive tools
//!
//! # Example
//!
//! ```rust,ignore
//! use research_core::{Feedback, ProviderRegistry, RigAgentAdapter, RunConfig, RunOutcome, WorkflowRunner};
//! use rig::client::{CompletionClient, ProviderClient};
//! use rig::providers::ollama;
//!
//! let client = ollama::Client::from_env();
//! let provider = RigAgentAdapter::with_names(client.agent("llama3.2").build(), "ollama", "llama3.2");
//!
//! let runner = WorkflowRunner::builder()
//!     .providers(ProviderRegistry::single(Arc::new(provider)))
//!     .build()?;
//!
//! let config = RunConfig::default().with_auto_accept_plan(false);
//! if let RunOutcome::Suspended { run_id, .. } = runner.run("What is the capital of France?", config).await? {
//!     runner.resume(&run_id, Feedback::Approve).await?;
//! }
//! ```

pub mod agents;
pub mod checkpoint;
pub mod compat;
pub mod config;
pub mod error;
pub mod graph;
pub mod llm;
pub mod nodes;
pub mod response;
pub mod runner;
pub mod state;
pub mod tools;

pub use agents::{AgentFactory, AgentSpec, PromptContext, PromptTemplate, ReactAgent};
pub use checkpoint::{
    create_checkpointer, Checkpoint, Checkpointer, CheckpointerConfig, DynCheckpointer, Feedback, FileCheckpointer,
    Interrupt, MemoryCheckpointer,
};
pub use compat::RigAgentAdapter;
pub use config::{ReportStyle, RetryPolicy, RunConfig};
pub use error::{AgentError, CheckpointError, LlmError, StateError, ToolError, WorkflowError};
pub use graph::{GraphEngine, NodeName, RunEvent, TransitionTable};
pub use llm::{AgentRole, CapabilityMap, LLMConfig, LLMProvider, LLMResponse, LlmType, ProviderRegistry, TokenUsage};
pub use response::{HealthResponse, ResearchError, ResearchProgress, ResearchRequest, ResearchResponse};
pub use runner::{RunOutcome, RunStream, WorkflowRunner, WorkflowRunnerBuilder};
pub use state::{Message, Plan, PlanSlot, Resource, Role, StateDelta, Step, StepStatus, StepType, WorkflowState};
pub use tools::{DynTool, TavilySearchTool, Tool, ToolContext, ToolDefinition, ToolOutput, ToolSet};
