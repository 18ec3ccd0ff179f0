use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use super::{prompt_context, tool_context, with_retry};
use crate::agents::{AgentFactory, AgentSpec, PromptTemplate};
use crate::error::{AgentError, LlmError, WorkflowError};
use crate::graph::{Node, NodeContext, NodeName, NodeOutput};
use crate::llm::AgentRole;
use crate::state::{Message, Plan, PlanSlot, StateDelta, WorkflowState};

const REPAIR_PROMPT: &str = "Your previous answer could not be parsed as a plan. \
Reply with a single JSON object matching the required format and nothing else.";

/// Produces a structured research plan.
///
/// Unparseable output is sent back to the model with a repair request until
/// the run's planner retry budget is spent. The last raw answer is then kept
/// as a draft plan so the reporter can still write something useful.
pub struct PlannerNode {
    factory: Arc<AgentFactory>,
}

impl PlannerNode {
    pub fn new(factory: Arc<AgentFactory>) -> Self {
        Self { factory }
    }
}

#[async_trait]
impl Node for PlannerNode {
    fn name(&self) -> NodeName {
        NodeName::Planner
    }

    async fn run(&self, state: &WorkflowState, ctx: &NodeContext) -> Result<NodeOutput, WorkflowError> {
        let config = &ctx.config;
        let agent = self
            .factory
            .create(
                AgentSpec::new("planner", AgentRole::Planner, PromptTemplate::Planner),
                prompt_context(state, config),
                config.max_agent_iterations,
            )
            .map_err(|e| WorkflowError::node(&ctx.run_id, NodeName::Planner, e))?;

        let mut input = state.messages.clone();
        if let Some(background) = &state.background_investigation_results {
            input.push(Message::user(&format!(
                "Background investigation results of the user query:\n\n{}",
                background
            )));
        }

        let tool_ctx = tool_context(ctx);
        let budget = config.planner_retry_budget.max(1);
        let mut last_raw = String::new();

        for attempt in 1..=budget {
            let output = match with_retry(ctx, NodeName::Planner, || agent.invoke(input.clone(), &tool_ctx)).await {
                Ok(run) => run.output,
                // The provider rejected its own structured output; same budget as a parse failure
                Err(AgentError::Llm(LlmError::MalformedOutput(raw))) => {
                    warn!(run_id = %ctx.run_id, attempt, budget, error = %raw, "Planner output malformed");
                    input.push(Message::user(REPAIR_PROMPT));
                    last_raw = raw;
                    continue;
                }
                Err(e) => return Err(WorkflowError::node(&ctx.run_id, NodeName::Planner, e)),
            };

            match Plan::parse(&output) {
                Ok(mut plan) => {
                    let dropped = plan.truncate_steps(config.max_step_num);
                    if dropped > 0 {
                        warn!(run_id = %ctx.run_id, dropped, "Plan exceeded the step limit, extra steps dropped");
                    }
                    if plan.locale.trim().is_empty() {
                        plan.locale = state.locale.clone();
                    }
                    info!(
                        run_id = %ctx.run_id,
                        attempt,
                        steps = plan.steps.len(),
                        has_enough_context = plan.has_enough_context,
                        "Plan accepted"
                    );

                    let mut delta = StateDelta::empty()
                        .with_message(Message::assistant(&output).with_name("planner"))
                        .with_plan(PlanSlot::Structured(plan));
                    delta.plan_iterations = 1;
                    return Ok(NodeOutput::Continue(delta));
                }
                Err(e) => {
                    warn!(run_id = %ctx.run_id, attempt, budget, error = %e, "Planner output rejected");
                    input.push(Message::assistant(&output).with_name("planner"));
                    input.push(Message::user(REPAIR_PROMPT));
                    last_raw = output;
                }
            }
        }

        warn!(run_id = %ctx.run_id, "Planner retry budget exhausted, keeping draft plan");
        let mut delta = StateDelta::empty().with_plan(PlanSlot::Draft(last_raw));
        delta.plan_iterations = 1;
        Ok(NodeOutput::Continue(delta))
    }
}
