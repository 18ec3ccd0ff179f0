//! The workflow state record and the deltas nodes produce
//!
//! Nodes never mutate [`WorkflowState`] directly. Each node returns a
//! [`StateDelta`]; the engine applies it with [`WorkflowState::apply`],
//! which validates the delta against the state invariants and yields a new
//! state. A rejected delta leaves the previous state untouched.

use serde::{Deserialize, Serialize};

use super::message::Message;
use super::plan::{PlanSlot, Resource, StepStatus};
use crate::error::StateError;

/// The single record threaded through the graph
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkflowState {
    /// Append-only conversation
    pub messages: Vec<Message>,
    /// Set once at entry
    pub locale: String,
    pub research_topic: String,
    pub clarified_research_topic: String,
    #[serde(default)]
    pub clarification_rounds: u32,
    #[serde(default)]
    pub current_plan: PlanSlot,
    #[serde(default)]
    pub plan_iterations: u32,
    /// Set by human review; cleared whenever a new plan is produced
    #[serde(default)]
    pub plan_approved: bool,
    /// Append-only findings
    #[serde(default)]
    pub observations: Vec<String>,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_investigation_results: Option<String>,
    pub auto_accepted_plan: bool,
    /// Set exactly once, by the reporter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_report: Option<String>,
}

impl WorkflowState {
    /// Initial state for a new run
    pub fn new(query: impl Into<String>, locale: impl Into<String>, auto_accepted_plan: bool) -> Self {
        let query = query.into();
        Self {
            messages: vec![Message::user(&query)],
            locale: locale.into(),
            research_topic: query.clone(),
            clarified_research_topic: query,
            auto_accepted_plan,
            ..Default::default()
        }
    }

    /// Topic the research should address (clarified when available)
    pub fn topic(&self) -> &str {
        if self.clarified_research_topic.trim().is_empty() {
            &self.research_topic
        } else {
            &self.clarified_research_topic
        }
    }

    /// False for drafts and unset plans
    pub fn has_enough_context(&self) -> bool {
        self.current_plan.plan().is_some_and(|p| p.has_enough_context)
    }

    pub fn is_terminal(&self) -> bool {
        self.final_report.is_some()
    }

    /// Apply a delta, returning the new state.
    ///
    /// Rejects deltas that would set the final report twice, move a step
    /// backwards, or touch a step of a plan that does not exist.
    pub fn apply(&self, delta: StateDelta) -> Result<Self, StateError> {
        let mut next = self.clone();

        if let Some(plan) = delta.current_plan {
            next.current_plan = plan;
            next.plan_approved = false;
        }

        for update in delta.step_updates {
            let plan = next
                .current_plan
                .plan_mut()
                .ok_or(StateError::NoStructuredPlan)?;
            let step = plan
                .steps
                .get_mut(update.index)
                .ok_or(StateError::StepOutOfRange(update.index))?;

            if !step.status.can_transition_to(update.status) {
                return Err(StateError::InvalidStepTransition {
                    index: update.index,
                    from: step.status,
                    to: update.status,
                });
            }
            step.status = update.status;
            if update.status.is_terminal() {
                step.execution_result = update.execution_result;
            }
        }

        if let Some(report) = delta.final_report {
            if next.final_report.is_some() {
                return Err(StateError::FinalReportAlreadySet);
            }
            next.final_report = Some(report);
        }

        next.messages.extend(delta.messages);
        next.observations.extend(delta.observations);
        next.resources.extend(delta.resources);

        if let Some(topic) = delta.clarified_research_topic {
            next.clarified_research_topic = topic;
        }
        next.clarification_rounds += delta.clarification_rounds;
        next.plan_iterations += delta.plan_iterations;
        if let Some(approved) = delta.plan_approved {
            next.plan_approved = approved;
        }
        if let Some(results) = delta.background_investigation_results {
            next.background_investigation_results = Some(results);
        }

        Ok(next)
    }
}

/// Status change for one plan step
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepUpdate {
    pub index: usize,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_result: Option<String>,
}

impl StepUpdate {
    pub fn started(index: usize) -> Self {
        Self {
            index,
            status: StepStatus::InProgress,
            execution_result: None,
        }
    }

    pub fn completed(index: usize, result: impl Into<String>) -> Self {
        Self {
            index,
            status: StepStatus::Completed,
            execution_result: Some(result.into()),
        }
    }

    pub fn failed(index: usize, error: impl Into<String>) -> Self {
        Self {
            index,
            status: StepStatus::Failed,
            execution_result: Some(error.into()),
        }
    }
}

/// Changes produced by one node execution
///
/// Counters (`plan_iterations`, `clarification_rounds`) are increments.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StateDelta {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clarified_research_topic: Option<String>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub clarification_rounds: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_plan: Option<PlanSlot>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub plan_iterations: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_approved: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub step_updates: Vec<StepUpdate>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub observations: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<Resource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_investigation_results: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_report: Option<String>,
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

impl StateDelta {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    pub fn with_observation(mut self, observation: impl Into<String>) -> Self {
        self.observations.push(observation.into());
        self
    }

    pub fn with_resources(mut self, resources: Vec<Resource>) -> Self {
        self.resources.extend(resources);
        self
    }

    pub fn with_plan(mut self, plan: PlanSlot) -> Self {
        self.current_plan = Some(plan);
        self
    }

    pub fn with_step_update(mut self, update: StepUpdate) -> Self {
        self.step_updates.push(update);
        self
    }

    pub fn with_final_report(mut self, report: impl Into<String>) -> Self {
        self.final_report = Some(report.into());
        self
    }
}
