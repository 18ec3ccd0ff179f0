use async_trait::async_trait;
use tracing::info;

use crate::checkpoint::{Feedback, Interrupt};
use crate::error::WorkflowError;
use crate::graph::{Node, NodeContext, NodeName, NodeOutput};
use crate::state::{Message, StateDelta, WorkflowState};

/// Suspension point for human plan review
pub struct HumanFeedbackNode;

#[async_trait]
impl Node for HumanFeedbackNode {
    fn name(&self) -> NodeName {
        NodeName::HumanFeedback
    }

    async fn run(&self, state: &WorkflowState, ctx: &NodeContext) -> Result<NodeOutput, WorkflowError> {
        let Some(feedback) = &ctx.feedback else {
            info!(run_id = %ctx.run_id, iteration = state.plan_iterations, "Waiting for plan review");
            return Ok(NodeOutput::Suspend {
                delta: StateDelta::empty(),
                interrupt: Interrupt::PlanReview {
                    plan: state.current_plan.clone(),
                },
            });
        };

        let delta = match feedback {
            Feedback::Approve => {
                info!(run_id = %ctx.run_id, "Plan approved");
                let mut delta = StateDelta::empty();
                delta.plan_approved = Some(true);
                delta
            }
            Feedback::Edit(text) => {
                info!(run_id = %ctx.run_id, "Plan edit requested");
                StateDelta::empty().with_message(Message::user(&format!("[EDIT_PLAN] {}", text)).with_name("feedback"))
            }
            Feedback::Reject(text) => {
                info!(run_id = %ctx.run_id, "Plan rejected");
                StateDelta::empty().with_message(Message::user(&format!("[REJECTED] {}", text)).with_name("feedback"))
            }
            Feedback::Answer(_) => {
                return Err(WorkflowError::InvalidFeedback {
                    run_id: ctx.run_id.clone(),
                    message: "plan review expects approve, edit or reject".to_string(),
                });
            }
        };

        Ok(NodeOutput::Continue(delta))
    }
}
