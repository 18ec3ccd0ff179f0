//! Tool contract shared by search providers and agent tools
//!
//! Tools are stateless and shared across runs. Per-call information (run id,
//! tool call id, recorded review decisions) travels in the [`ToolContext`].

mod interceptor;
mod tavily;

pub use interceptor::{intercept_tools, InterceptedTool, ReviewLedger, ToolDecision, ToolInterrupt};
pub use tavily::{SearchDepth, TavilyError, TavilySearchTool, Topic};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::ToolError;
use crate::state::Resource;

/// Tool schema presented to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments
    pub parameters: serde_json::Value,
}

/// Result of a tool invocation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolOutput {
    /// Text returned to the model
    pub content: String,
    /// Sources discovered by the tool
    pub resources: Vec<Resource>,
}

impl ToolOutput {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            resources: Vec::new(),
        }
    }

    pub fn with_resources(mut self, resources: Vec<Resource>) -> Self {
        self.resources = resources;
        self
    }
}

/// Per-call execution context
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub run_id: String,
    pub tool_call_id: String,
    /// Review decisions recorded for this run
    pub reviews: Arc<ReviewLedger>,
}

impl ToolContext {
    pub fn new(run_id: impl Into<String>, reviews: Arc<ReviewLedger>) -> Self {
        Self {
            run_id: run_id.into(),
            tool_call_id: String::new(),
            reviews,
        }
    }

    /// Context for one specific tool call
    pub fn for_call(&self, tool_call_id: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            ..self.clone()
        }
    }
}

/// A capability the agents can invoke
#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    fn name(&self) -> String {
        self.definition().name
    }

    async fn invoke(&self, args: serde_json::Value, ctx: &ToolContext) -> Result<ToolOutput, ToolError>;
}

pub type DynTool = Arc<dyn Tool>;

/// Ordered tool collection
#[derive(Clone, Default)]
pub struct ToolSet {
    tools: Vec<DynTool>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool; a tool with the same name replaces the earlier one
    pub fn with(mut self, tool: DynTool) -> Self {
        self.insert(tool);
        self
    }

    pub fn insert(&mut self, tool: DynTool) {
        let name = tool.name();
        match self.tools.iter().position(|t| t.name() == name) {
            Some(index) => self.tools[index] = tool,
            None => self.tools.push(tool),
        }
    }

    pub fn get(&self, name: &str) -> Option<&DynTool> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DynTool> {
        self.tools.iter()
    }
}

impl FromIterator<DynTool> for ToolSet {
    fn from_iter<I: IntoIterator<Item = DynTool>>(iter: I) -> Self {
        let mut set = ToolSet::new();
        for tool in iter {
            set.insert(tool);
        }
        set
    }
}

impl std::fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
