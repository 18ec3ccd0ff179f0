use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::WorkflowError;
use crate::graph::{Node, NodeContext, NodeName, NodeOutput};
use crate::state::{StateDelta, StepUpdate, WorkflowState};

/// Dispatcher: starts the first pending step, in list order
pub struct ResearchTeamNode;

#[async_trait]
impl Node for ResearchTeamNode {
    fn name(&self) -> NodeName {
        NodeName::ResearchTeam
    }

    async fn run(&self, state: &WorkflowState, ctx: &NodeContext) -> Result<NodeOutput, WorkflowError> {
        let Some(plan) = state.current_plan.plan() else {
            return Ok(NodeOutput::Continue(StateDelta::empty()));
        };

        if let Some(active) = plan.active_step() {
            debug!(run_id = %ctx.run_id, step = active, "Step already in progress");
            return Ok(NodeOutput::Continue(StateDelta::empty()));
        }

        let delta = match plan.next_pending() {
            Some(index) => {
                info!(
                    run_id = %ctx.run_id,
                    step = index,
                    title = %plan.steps[index].title,
                    step_type = ?plan.steps[index].step_type,
                    "Dispatching step"
                );
                StateDelta::empty().with_step_update(StepUpdate::started(index))
            }
            None => {
                info!(run_id = %ctx.run_id, "All steps finished");
                StateDelta::empty()
            }
        };

        Ok(NodeOutput::Continue(delta))
    }
}
