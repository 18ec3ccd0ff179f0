use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use super::{prompt_context, tool_context, with_retry};
use crate::agents::{AgentFactory, AgentSpec, PromptTemplate};
use crate::checkpoint::Interrupt;
use crate::error::{AgentError, WorkflowError};
use crate::graph::{Node, NodeContext, NodeName, NodeOutput};
use crate::llm::AgentRole;
use crate::state::{Message, Plan, StateDelta, StepStatus, StepUpdate, WorkflowState};
use crate::tools::ToolSet;

/// Executes the in-progress plan step with a role's agent and tools.
///
/// The researcher and the coder share this node; they differ in role,
/// prompt and tool set.
pub struct StepExecutorNode {
    node: NodeName,
    role: AgentRole,
    template: PromptTemplate,
    tools: ToolSet,
    factory: Arc<AgentFactory>,
}

impl StepExecutorNode {
    pub fn researcher(factory: Arc<AgentFactory>, tools: ToolSet) -> Self {
        Self {
            node: NodeName::Researcher,
            role: AgentRole::Researcher,
            template: PromptTemplate::Researcher,
            tools,
            factory,
        }
    }

    pub fn coder(factory: Arc<AgentFactory>, tools: ToolSet) -> Self {
        Self {
            node: NodeName::Coder,
            role: AgentRole::Coder,
            template: PromptTemplate::Coder,
            tools,
            factory,
        }
    }
}

/// Task message: topic, findings of finished steps, then the step itself
fn step_request(state: &WorkflowState, plan: &Plan, index: usize) -> Message {
    let step = &plan.steps[index];
    let mut text = format!("# Research Topic\n\n{}\n\n", state.topic());

    let finished: Vec<_> = plan
        .steps
        .iter()
        .filter(|s| s.status == StepStatus::Completed)
        .filter_map(|s| s.execution_result.as_deref().map(|r| (s.title.as_str(), r)))
        .collect();
    if !finished.is_empty() {
        text.push_str("# Existing Findings\n\n");
        for (title, result) in finished {
            text.push_str(&format!("## {}\n\n{}\n\n", title, result));
        }
    }

    text.push_str(&format!(
        "# Current Task\n\n## {}\n\n{}\n\n## Locale\n\n{}",
        step.title, step.description, state.locale
    ));
    Message::user(&text)
}

#[async_trait]
impl Node for StepExecutorNode {
    fn name(&self) -> NodeName {
        self.node
    }

    async fn run(&self, state: &WorkflowState, ctx: &NodeContext) -> Result<NodeOutput, WorkflowError> {
        let (plan, index) = state
            .current_plan
            .plan()
            .and_then(|plan| plan.active_step().map(|i| (plan, i)))
            .ok_or_else(|| WorkflowError::invariant(&ctx.run_id, format!("{} ran without an active step", self.node)))?;
        let step = &plan.steps[index];
        let config = &ctx.config;

        let spec = AgentSpec::new(self.node.as_str(), self.role, self.template)
            .with_tools(self.tools.clone())
            .with_interrupt_before(config.interrupt_before_tools.iter().cloned());
        let agent = self
            .factory
            .create(spec, prompt_context(state, config), config.max_agent_iterations)
            .map_err(|e| WorkflowError::node(&ctx.run_id, self.node, e))?;

        info!(run_id = %ctx.run_id, node = %self.node, step = index, title = %step.title, "Executing step");

        let input = vec![step_request(state, plan, index)];
        let tool_ctx = tool_context(ctx);
        let result = with_retry(ctx, self.node, || agent.invoke(input.clone(), &tool_ctx)).await;

        let delta = match result {
            Ok(run) => {
                info!(
                    run_id = %ctx.run_id,
                    step = index,
                    sources = run.resources.len(),
                    total_tokens = run.usage.total_tokens,
                    "Step completed"
                );
                StateDelta::empty()
                    .with_step_update(StepUpdate::completed(index, &run.output))
                    .with_observation(run.output.clone())
                    .with_resources(run.resources)
                    .with_message(Message::assistant(&run.output).with_name(self.node.as_str()))
            }
            Err(AgentError::Interrupted(interrupt)) => {
                info!(run_id = %ctx.run_id, step = index, tool = %interrupt.tool_name, "Step waiting for tool approval");
                return Ok(NodeOutput::Suspend {
                    delta: StateDelta::empty(),
                    interrupt: Interrupt::ToolApproval(interrupt),
                });
            }
            Err(e) => {
                warn!(run_id = %ctx.run_id, step = index, error = %e, "Step failed");
                let error = format!("Step '{}' failed: {}", step.title, e);
                StateDelta::empty()
                    .with_step_update(StepUpdate::failed(index, &error))
                    .with_observation(error)
            }
        };

        Ok(NodeOutput::Continue(delta))
    }
}
