//! Workflow nodes
//!
//! Each node reads the current state, does its work, and returns a delta.
//! Recoverable agent failures become part of the delta (an observation or a
//! failed step). Only failures the workflow cannot continue past are
//! returned as errors.

mod background;
mod coordinator;
mod human_feedback;
mod planner;
mod reporter;
mod research_team;
mod step;

pub use background::BackgroundInvestigatorNode;
pub use coordinator::{CoordinatorNode, ASK_CLARIFICATION, HANDOFF_TO_PLANNER};
pub use human_feedback::HumanFeedbackNode;
pub use planner::PlannerNode;
pub use reporter::ReporterNode;
pub use research_team::ResearchTeamNode;
pub use step::StepExecutorNode;

use std::future::Future;
use std::sync::Arc;
use tracing::warn;

use crate::agents::{AgentFactory, PromptContext};
use crate::config::RunConfig;
use crate::error::AgentError;
use crate::graph::{DynNode, NodeContext, NodeName};
use crate::state::WorkflowState;
use crate::tools::{DynTool, ToolContext, ToolSet};

/// The eight research nodes wired to shared providers and tools
pub fn research_nodes(
    factory: Arc<AgentFactory>,
    search: Option<DynTool>,
    researcher_tools: ToolSet,
    coder_tools: ToolSet,
) -> Vec<DynNode> {
    vec![
        Arc::new(CoordinatorNode::new(Arc::clone(&factory))),
        Arc::new(BackgroundInvestigatorNode::new(search)),
        Arc::new(PlannerNode::new(Arc::clone(&factory))),
        Arc::new(HumanFeedbackNode),
        Arc::new(ResearchTeamNode),
        Arc::new(StepExecutorNode::researcher(Arc::clone(&factory), researcher_tools)),
        Arc::new(StepExecutorNode::coder(Arc::clone(&factory), coder_tools)),
        Arc::new(ReporterNode::new(factory)),
    ]
}

/// Prompt values for agents built during this node
pub(crate) fn prompt_context(state: &WorkflowState, config: &RunConfig) -> PromptContext {
    PromptContext::new(&state.locale, state.topic())
        .with_max_step_num(config.max_step_num)
        .with_report_style(config.report_style)
}

pub(crate) fn tool_context(ctx: &NodeContext) -> ToolContext {
    ToolContext::new(&ctx.run_id, Arc::clone(&ctx.reviews))
}

/// Run `op` with the node timeout, retrying transient failures per the
/// run's retry policy.
pub(crate) async fn with_retry<T, F, Fut>(ctx: &NodeContext, node: NodeName, op: F) -> Result<T, AgentError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, AgentError>>,
{
    let policy = &ctx.config.retry_policy;
    let timeout = ctx.config.node_timeout;
    let mut retries = 0;

    loop {
        let result = match tokio::time::timeout(timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(AgentError::Timeout(timeout)),
        };

        match result {
            Err(e) if e.is_transient() && policy.should_retry(retries) => {
                let delay = policy.delay_for_attempt(retries);
                retries += 1;
                warn!(
                    run_id = %ctx.run_id,
                    node = %node,
                    attempt = retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use crate::error::LlmError;
    use crate::tools::ReviewLedger;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn ctx(config: RunConfig) -> NodeContext {
        NodeContext {
            run_id: "run-1".into(),
            config: Arc::new(config),
            feedback: None,
            reviews: Arc::new(ReviewLedger::new()),
        }
    }

    fn fast_retries(max: u32) -> RunConfig {
        RunConfig::default().with_retry_policy(RetryPolicy::new(max).with_backoff_base(Duration::from_millis(1)))
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried_up_to_policy() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), AgentError> = with_retry(&ctx(fast_retries(2)), NodeName::Researcher, || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(AgentError::Llm(LlmError::Transient("503".into())))
        })
        .await;

        assert!(result.unwrap_err().is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), AgentError> = with_retry(&ctx(fast_retries(2)), NodeName::Researcher, || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(AgentError::Llm(LlmError::Provider("bad key".into())))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failure() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = with_retry(&ctx(fast_retries(2)), NodeName::Planner, || async move {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(AgentError::Llm(LlmError::Transient("timeout".into())))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_slow_attempt_times_out() {
        let config = fast_retries(0).with_node_timeout(Duration::from_millis(10));
        let result: Result<(), AgentError> = with_retry(&ctx(config), NodeName::Reporter, || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(AgentError::Timeout(_))));
    }
}
