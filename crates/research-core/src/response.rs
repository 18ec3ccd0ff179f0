//! Serializable shapes exchanged with the API layer
//!
//! These types carry no behavior of their own. They translate requests into
//! a [`RunConfig`] and runner results into the JSON bodies the API returns.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::{ReportStyle, RunConfig};
use crate::error::WorkflowError;
use crate::graph::{NodeName, RunEvent};
use crate::llm::ProviderRegistry;
use crate::runner::RunOutcome;
use crate::state::{Plan, PlanSlot, Resource, WorkflowState};

/// Research task submitted by a client
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_step_num: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_plan_iterations: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_clarification: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_background_investigation: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_accept_plan: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
}

impl ResearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    /// Overlay the fields the client set onto `base`
    pub fn to_config(&self, base: RunConfig) -> Result<RunConfig, WorkflowError> {
        let mut config = base;
        if let Some(max) = self.max_step_num {
            config.max_step_num = max;
        }
        if let Some(max) = self.max_plan_iterations {
            config.max_plan_iterations = max;
        }
        if let Some(enabled) = self.enable_clarification {
            config.enable_clarification = enabled;
        }
        if let Some(enabled) = self.enable_background_investigation {
            config.enable_background_investigation = enabled;
        }
        if let Some(auto_accept) = self.auto_accept_plan {
            config.auto_accept_plan = auto_accept;
        }
        if let Some(style) = &self.report_style {
            config.report_style = style.parse::<ReportStyle>()?;
        }
        if let Some(locale) = &self.locale {
            config.locale = locale.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

/// Final answer of a completed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchResponse {
    pub research_id: String,
    pub query: String,
    /// Absent when the planner never produced a structured plan
    pub plan: Option<Plan>,
    pub final_report: String,
    pub observations: Vec<String>,
    pub resources: Vec<Resource>,
    pub locale: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ResearchResponse {
    /// Build the response for a completed outcome; `None` while suspended
    pub fn from_outcome(outcome: &RunOutcome) -> Option<Self> {
        match outcome {
            RunOutcome::Completed { run_id, state, path } => Some(Self::from_state(run_id, state, path)),
            RunOutcome::Suspended { .. } => None,
        }
    }

    pub fn from_state(research_id: &str, state: &WorkflowState, path: &[NodeName]) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert("plan_iterations".to_string(), serde_json::json!(state.plan_iterations));
        metadata.insert("clarification_rounds".to_string(), serde_json::json!(state.clarification_rounds));
        metadata.insert(
            "path".to_string(),
            serde_json::json!(path.iter().map(NodeName::as_str).collect::<Vec<_>>()),
        );
        if let PlanSlot::Draft(raw) = &state.current_plan {
            metadata.insert("draft_plan".to_string(), serde_json::json!(raw));
        }

        Self {
            research_id: research_id.to_string(),
            query: state.research_topic.clone(),
            plan: state.current_plan.plan().cloned(),
            final_report: state.final_report.clone().unwrap_or_default(),
            observations: state.observations.clone(),
            resources: state.resources.clone(),
            locale: state.locale.clone(),
            metadata,
        }
    }
}

/// One streamed progress update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchProgress {
    /// Node that produced the update, or `end`
    pub stage: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<Plan>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_steps: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub observations: Vec<String>,
}

impl ResearchProgress {
    pub fn from_event(event: &RunEvent) -> Self {
        match event {
            RunEvent::Step { node, delta } => {
                let plan = delta.current_plan.as_ref().and_then(PlanSlot::plan).cloned();
                let update = delta.step_updates.last();
                let message = match (&plan, update) {
                    (Some(plan), _) => format!("Plan ready: {} ({} steps)", plan.title, plan.steps.len()),
                    (None, Some(update)) => format!("Step {} is now {}", update.index + 1, update.status),
                    (None, None) if delta.final_report.is_some() => "Final report written".to_string(),
                    (None, None) => format!("{} finished", node),
                };
                Self {
                    stage: node.as_str().to_string(),
                    message,
                    total_steps: plan.as_ref().map(|p| p.steps.len()),
                    plan,
                    current_step: update.map(|u| u.index),
                    observations: delta.observations.clone(),
                }
            }
            RunEvent::Suspended { node, interrupt } => Self {
                stage: node.as_str().to_string(),
                message: interrupt.prompt(),
                plan: None,
                current_step: None,
                total_steps: None,
                observations: Vec::new(),
            },
            RunEvent::Finished(state) => Self {
                stage: NodeName::End.as_str().to_string(),
                message: "Research completed".to_string(),
                plan: state.current_plan.plan().cloned(),
                current_step: None,
                total_steps: state.current_plan.plan().map(|p| p.steps.len()),
                observations: Vec::new(),
            },
        }
    }
}

/// Error body for a failed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchError {
    /// Stable error code
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub research_id: Option<String>,
}

impl From<&WorkflowError> for ResearchError {
    fn from(e: &WorkflowError) -> Self {
        let code = match e {
            WorkflowError::InvariantViolation { .. } => "invariant_violation",
            WorkflowError::Checkpoint { .. } => "checkpoint_failure",
            WorkflowError::NoTransition { .. } => "no_transition",
            WorkflowError::Node { .. } => "node_failure",
            WorkflowError::RecursionLimit { .. } => "recursion_limit",
            WorkflowError::Cancelled(_) => "cancelled",
            WorkflowError::RunNotFound(_) => "run_not_found",
            WorkflowError::NotSuspended(_) => "not_suspended",
            WorkflowError::InvalidFeedback { .. } => "invalid_feedback",
            WorkflowError::RunInProgress(_) => "run_in_progress",
            WorkflowError::Config(_) => "invalid_config",
        };
        Self {
            error: code.to_string(),
            detail: Some(e.to_string()),
            research_id: e.run_id().map(str::to_string),
        }
    }
}

impl From<WorkflowError> for ResearchError {
    fn from(e: WorkflowError) -> Self {
        Self::from(&e)
    }
}

/// Service health summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub models_available: Vec<String>,
}

impl HealthResponse {
    pub fn from_providers(providers: &ProviderRegistry) -> Self {
        let models_available = providers.models();
        Self {
            status: if models_available.is_empty() { "degraded" } else { "healthy" }.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            models_available,
        }
    }
}
