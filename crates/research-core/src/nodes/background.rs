use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use super::{tool_context, with_retry};
use crate::error::{AgentError, WorkflowError};
use crate::graph::{Node, NodeContext, NodeName, NodeOutput};
use crate::state::{StateDelta, WorkflowState};
use crate::tools::{DynTool, Tool, ToolContext, ToolOutput};

/// One broad search before planning
pub struct BackgroundInvestigatorNode {
    search: Option<DynTool>,
}

impl BackgroundInvestigatorNode {
    pub fn new(search: Option<DynTool>) -> Self {
        Self { search }
    }
}

async fn search_once(tool: &dyn Tool, args: serde_json::Value, ctx: &ToolContext) -> Result<ToolOutput, AgentError> {
    tool.invoke(args, ctx)
        .await
        .map_err(|e| AgentError::from_tool(tool.name(), e))
}

#[async_trait]
impl Node for BackgroundInvestigatorNode {
    fn name(&self) -> NodeName {
        NodeName::BackgroundInvestigator
    }

    async fn run(&self, state: &WorkflowState, ctx: &NodeContext) -> Result<NodeOutput, WorkflowError> {
        let Some(search) = &self.search else {
            warn!(run_id = %ctx.run_id, "No search tool configured, skipping background investigation");
            return Ok(NodeOutput::Continue(StateDelta::empty()));
        };

        let topic = state.topic();
        let args = json!({"query": topic, "max_results": ctx.config.max_search_results});
        let tool_ctx = tool_context(ctx).for_call("background_investigation");

        let result = with_retry(ctx, NodeName::BackgroundInvestigator, || {
            search_once(search.as_ref(), args.clone(), &tool_ctx)
        })
        .await;

        let delta = match result {
            Ok(output) => {
                info!(run_id = %ctx.run_id, sources = output.resources.len(), "Background investigation finished");
                let mut delta = StateDelta::empty()
                    .with_observation(format!("Background investigation for '{}':\n\n{}", topic, output.content))
                    .with_resources(output.resources);
                delta.background_investigation_results = Some(output.content);
                delta
            }
            Err(e) => {
                warn!(run_id = %ctx.run_id, error = %e, "Background investigation failed");
                StateDelta::empty().with_observation(format!("Background investigation failed: {}", e))
            }
        };

        Ok(NodeOutput::Continue(delta))
    }
}
