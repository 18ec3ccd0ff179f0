use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use super::{prompt_context, tool_context, with_retry};
use crate::agents::{AgentFactory, AgentSpec, PromptTemplate};
use crate::error::WorkflowError;
use crate::graph::{Node, NodeContext, NodeName, NodeOutput};
use crate::llm::AgentRole;
use crate::state::{Message, PlanSlot, StateDelta, WorkflowState};

/// Writes the final report from everything the run collected
pub struct ReporterNode {
    factory: Arc<AgentFactory>,
}

impl ReporterNode {
    pub fn new(factory: Arc<AgentFactory>) -> Self {
        Self { factory }
    }
}

fn report_request(state: &WorkflowState) -> Message {
    let mut text = format!("# Research Requirements\n\n## Task\n\n{}\n\n", state.topic());

    match &state.current_plan {
        PlanSlot::Structured(plan) => {
            text.push_str(&format!("## Plan\n\n{}\n\n{}\n\n", plan.title, plan.thought));
        }
        PlanSlot::Draft(raw) if !raw.trim().is_empty() => {
            text.push_str(&format!("## Draft Plan\n\n{}\n\n", raw));
        }
        _ => {}
    }

    if !state.observations.is_empty() {
        text.push_str("# Observations\n\n");
        for observation in &state.observations {
            text.push_str(observation);
            text.push_str("\n\n");
        }
    }

    if !state.resources.is_empty() {
        text.push_str("# References\n\n");
        for resource in &state.resources {
            text.push_str(&format!("- [{}]({})\n", resource.title, resource.url));
        }
        text.push('\n');
    }

    text.push_str(
        "Write the final report from the observations above. \
Cite sources from the references list and do not invent facts that are not supported by them.",
    );
    Message::user(&text)
}

/// Report compiled without the model, used when it returns nothing
fn digest(state: &WorkflowState) -> String {
    let mut text = format!("# {}\n\n", state.topic());

    if state.observations.is_empty() {
        text.push_str("No findings were collected for this request.\n");
    } else {
        text.push_str("## Findings\n\n");
        for observation in &state.observations {
            text.push_str(&format!("- {}\n", observation.trim()));
        }
    }

    if !state.resources.is_empty() {
        text.push_str("\n## References\n\n");
        for resource in &state.resources {
            text.push_str(&format!("- [{}]({})\n", resource.title, resource.url));
        }
    }
    text
}

#[async_trait]
impl Node for ReporterNode {
    fn name(&self) -> NodeName {
        NodeName::Reporter
    }

    async fn run(&self, state: &WorkflowState, ctx: &NodeContext) -> Result<NodeOutput, WorkflowError> {
        let config = &ctx.config;
        let agent = self
            .factory
            .create(
                AgentSpec::new("reporter", AgentRole::Reporter, PromptTemplate::Reporter),
                prompt_context(state, config),
                config.max_agent_iterations,
            )
            .map_err(|e| WorkflowError::node(&ctx.run_id, NodeName::Reporter, e))?;

        let input = vec![report_request(state)];
        let tool_ctx = tool_context(ctx);
        let run = with_retry(ctx, NodeName::Reporter, || agent.invoke(input.clone(), &tool_ctx))
            .await
            .map_err(|e| WorkflowError::node(&ctx.run_id, NodeName::Reporter, e))?;

        let report = if run.output.trim().is_empty() {
            warn!(run_id = %ctx.run_id, "Reporter returned an empty answer, compiling findings instead");
            digest(state)
        } else {
            run.output
        };

        info!(run_id = %ctx.run_id, chars = report.len(), "Final report written");
        Ok(NodeOutput::Continue(
            StateDelta::empty()
                .with_message(Message::assistant(&report).with_name("reporter"))
                .with_final_report(report),
        ))
    }
}
