use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use super::{prompt_context, with_retry};
use crate::agents::{AgentFactory, AgentSpec, PromptTemplate};
use crate::checkpoint::{Feedback, Interrupt};
use crate::error::WorkflowError;
use crate::graph::{Node, NodeContext, NodeName, NodeOutput};
use crate::llm::AgentRole;
use crate::state::{Message, StateDelta, WorkflowState};
use crate::tools::ToolDefinition;

pub const HANDOFF_TO_PLANNER: &str = "handoff_to_planner";
pub const ASK_CLARIFICATION: &str = "ask_clarification";

fn handoff_signal() -> ToolDefinition {
    ToolDefinition {
        name: HANDOFF_TO_PLANNER.to_string(),
        description: "Hand the research request off to the planner.".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "research_topic": {
                    "type": "string",
                    "description": "Concise statement of what should be researched"
                }
            },
            "required": ["research_topic"]
        }),
    }
}

fn clarification_signal() -> ToolDefinition {
    ToolDefinition {
        name: ASK_CLARIFICATION.to_string(),
        description: "Ask the user one question to clarify an ambiguous request.".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "question": {"type": "string"}
            },
            "required": ["question"]
        }),
    }
}

fn string_arg(arguments: &serde_json::Value, key: &str) -> Option<String> {
    arguments
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Interprets the request and fixes the research topic
pub struct CoordinatorNode {
    factory: Arc<AgentFactory>,
}

impl CoordinatorNode {
    pub fn new(factory: Arc<AgentFactory>) -> Self {
        Self { factory }
    }
}

#[async_trait]
impl Node for CoordinatorNode {
    fn name(&self) -> NodeName {
        NodeName::Coordinator
    }

    async fn run(&self, state: &WorkflowState, ctx: &NodeContext) -> Result<NodeOutput, WorkflowError> {
        let config = &ctx.config;
        let mut delta = StateDelta::empty();
        let mut input = state.messages.clone();

        let answer = match &ctx.feedback {
            Some(Feedback::Answer(answer)) => {
                let message = Message::user(answer);
                input.push(message.clone());
                delta = delta.with_message(message);
                Some(answer.clone())
            }
            _ => None,
        };

        let clarification_allowed = config.clarification_allowed(state.clarification_rounds);
        let mut signals = vec![handoff_signal()];
        if clarification_allowed {
            signals.push(clarification_signal());
        }

        let agent = self
            .factory
            .create(
                AgentSpec::new("coordinator", AgentRole::Coordinator, PromptTemplate::Coordinator),
                prompt_context(state, config),
                config.max_agent_iterations,
            )
            .map_err(|e| WorkflowError::node(&ctx.run_id, NodeName::Coordinator, e))?;

        let response = match with_retry(ctx, NodeName::Coordinator, || agent.decide(input.clone(), &signals)).await {
            Ok(response) => response,
            Err(e) => {
                warn!(run_id = %ctx.run_id, error = %e, "Coordinator failed, keeping original topic");
                if let Some(answer) = answer {
                    delta.clarified_research_topic = Some(format!("{} ({})", state.topic(), answer));
                }
                return Ok(NodeOutput::Continue(delta));
            }
        };

        let calls = response.message.tool_calls.clone().unwrap_or_default();

        if clarification_allowed {
            let question = calls
                .iter()
                .filter(|c| c.name == ASK_CLARIFICATION)
                .find_map(|c| string_arg(&c.arguments, "question"));
            if let Some(question) = question {
                info!(run_id = %ctx.run_id, round = state.clarification_rounds + 1, "Requesting clarification");
                delta.clarification_rounds = 1;
                delta = delta.with_message(Message::assistant(&question).with_name("coordinator"));
                return Ok(NodeOutput::Suspend {
                    delta,
                    interrupt: Interrupt::Clarification { question },
                });
            }
        }

        let topic = calls
            .iter()
            .filter(|c| c.name == HANDOFF_TO_PLANNER)
            .find_map(|c| string_arg(&c.arguments, "research_topic"));

        match topic {
            Some(topic) => {
                info!(run_id = %ctx.run_id, topic = %topic, "Handing off to planner");
                delta.clarified_research_topic = Some(topic);
            }
            None => {
                info!(run_id = %ctx.run_id, "No handoff signal, keeping original topic");
                if let Some(answer) = answer {
                    delta.clarified_research_topic = Some(format!("{} ({})", state.topic(), answer));
                }
                if !response.message.content.trim().is_empty() {
                    delta = delta.with_message(response.message.with_name("coordinator"));
                }
            }
        }

        Ok(NodeOutput::Continue(delta))
    }
}
