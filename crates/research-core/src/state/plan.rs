//! Research plan, steps and collected resources

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kind of work a step requires
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    /// Information gathering, executed by the researcher
    #[default]
    Research,
    /// Computation or data processing, executed by the coder
    Processing,
}

/// Step lifecycle status
///
/// Transitions are monotonic: `pending -> in_progress -> completed | failed`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::InProgress => "in_progress",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Failed)
    }

    pub fn can_transition_to(&self, next: StepStatus) -> bool {
        matches!(
            (self, next),
            (StepStatus::Pending, StepStatus::InProgress)
                | (StepStatus::InProgress, StepStatus::Completed)
                | (StepStatus::InProgress, StepStatus::Failed)
        )
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of planned work
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Step {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub step_type: StepType,
    #[serde(default)]
    pub need_search: bool,
    #[serde(default)]
    pub status: StepStatus,
    /// Set only when the step completes or fails
    #[serde(default, alias = "execution_res", skip_serializing_if = "Option::is_none")]
    pub execution_result: Option<String>,
}

impl Step {
    pub fn new(title: impl Into<String>, description: impl Into<String>, step_type: StepType) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            step_type,
            need_search: step_type == StepType::Research,
            status: StepStatus::Pending,
            execution_result: None,
        }
    }
}

/// Structured decomposition of the research query
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Plan {
    #[serde(default)]
    pub locale: String,
    #[serde(default)]
    pub has_enough_context: bool,
    #[serde(default)]
    pub thought: String,
    pub title: String,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Plan {
    pub fn new(title: impl Into<String>, thought: impl Into<String>) -> Self {
        Self {
            locale: String::new(),
            has_enough_context: false,
            thought: thought.into(),
            title: title.into(),
            steps: Vec::new(),
        }
    }

    pub fn with_steps(mut self, steps: Vec<Step>) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_enough_context(mut self, has_enough_context: bool) -> Self {
        self.has_enough_context = has_enough_context;
        self
    }

    /// Parse model output into a plan.
    ///
    /// Accepts bare JSON, JSON wrapped in a markdown code fence, or JSON
    /// surrounded by prose. Step status and results are reset; the model
    /// does not own them.
    pub fn parse(raw: &str) -> Result<Self, PlanParseError> {
        let body = extract_json(raw).ok_or(PlanParseError::Empty)?;
        let mut plan: Plan = serde_json::from_str(body)?;

        if plan.title.trim().is_empty() {
            return Err(PlanParseError::Invalid("plan title is empty".to_string()));
        }
        if let Some(index) = plan.steps.iter().position(|s| s.title.trim().is_empty()) {
            return Err(PlanParseError::Invalid(format!("step {} has no title", index)));
        }

        for step in &mut plan.steps {
            step.status = StepStatus::Pending;
            step.execution_result = None;
        }
        Ok(plan)
    }

    /// Drop steps beyond `max_steps`
    pub fn truncate_steps(&mut self, max_steps: usize) -> usize {
        let dropped = self.steps.len().saturating_sub(max_steps);
        self.steps.truncate(max_steps);
        dropped
    }

    /// Index of the first step still waiting to run
    pub fn next_pending(&self) -> Option<usize> {
        self.steps.iter().position(|s| s.status == StepStatus::Pending)
    }

    /// Index of the step currently being executed
    pub fn active_step(&self) -> Option<usize> {
        self.steps.iter().position(|s| s.status == StepStatus::InProgress)
    }
}

/// Errors parsing a plan from model output
#[derive(Debug, Error)]
pub enum PlanParseError {
    #[error("no JSON object found in planner output")]
    Empty,

    #[error("planner output is not valid plan JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("planner output is not a usable plan: {0}")]
    Invalid(String),
}

fn code_fence() -> Option<&'static Regex> {
    static CODE_FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    CODE_FENCE
        .get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)```").ok())
        .as_ref()
}

fn extract_json(raw: &str) -> Option<&str> {
    let fenced = code_fence()
        .and_then(|re| re.captures(raw))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(raw);

    let start = fenced.find('{')?;
    let end = fenced.rfind('}')?;
    (start < end).then(|| &fenced[start..=end])
}

/// Current plan slot: unset, a raw draft, or a structured plan
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PlanSlot {
    #[default]
    Unset,
    /// Unparseable planner output kept for the reporter
    Draft(String),
    Structured(Plan),
}

impl PlanSlot {
    pub fn is_structured(&self) -> bool {
        matches!(self, PlanSlot::Structured(_))
    }

    pub fn plan(&self) -> Option<&Plan> {
        match self {
            PlanSlot::Structured(plan) => Some(plan),
            _ => None,
        }
    }

    pub fn plan_mut(&mut self) -> Option<&mut Plan> {
        match self {
            PlanSlot::Structured(plan) => Some(plan),
            _ => None,
        }
    }
}

/// A source record collected during investigation or research
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Resource {
    pub title: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

impl Resource {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            snippet: None,
        }
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = Some(snippet.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN_JSON: &str = r#"{
        "locale": "en-US",
        "has_enough_context": false,
        "thought": "Need to confirm the capital",
        "title": "Capital of France",
        "steps": [
            {"title": "Search", "description": "Look it up", "step_type": "research", "need_search": true},
            {"title": "Tabulate", "description": "Build a table", "step_type": "processing", "need_search": false, "status": "completed", "execution_res": "stale"}
        ]
    }"#;

    #[test]
    fn test_step_status_transitions_are_monotonic() {
        assert!(StepStatus::Pending.can_transition_to(StepStatus::InProgress));
        assert!(StepStatus::InProgress.can_transition_to(StepStatus::Completed));
        assert!(StepStatus::InProgress.can_transition_to(StepStatus::Failed));

        assert!(!StepStatus::Pending.can_transition_to(StepStatus::Completed));
        assert!(!StepStatus::Completed.can_transition_to(StepStatus::InProgress));
        assert!(!StepStatus::Failed.can_transition_to(StepStatus::Completed));
        assert!(!StepStatus::Completed.can_transition_to(StepStatus::Completed));
    }

    #[test]
    fn test_parse_plain_json_resets_model_owned_fields() {
        let plan = Plan::parse(PLAN_JSON).unwrap();

        assert_eq!(plan.title, "Capital of France");
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[1].step_type, StepType::Processing);
        assert_eq!(plan.steps[1].status, StepStatus::Pending);
        assert!(plan.steps[1].execution_result.is_none());
    }

    #[test]
    fn test_parse_fenced_json_with_prose() {
        let raw = format!("Here is the plan:\n```json\n{}\n```\nGood luck.", PLAN_JSON);
        let plan = Plan::parse(&raw).unwrap();
        assert_eq!(plan.next_pending(), Some(0));
    }

    #[test]
    fn test_parse_rejects_malformed_output() {
        assert!(matches!(Plan::parse("I cannot help with that"), Err(PlanParseError::Empty)));
        assert!(matches!(Plan::parse("{ not json }"), Err(PlanParseError::Json(_))));
        assert!(matches!(
            Plan::parse(r#"{"title": "  ", "steps": []}"#),
            Err(PlanParseError::Invalid(_))
        ));
    }

    #[test]
    fn test_truncate_steps() {
        let mut plan = Plan::parse(PLAN_JSON).unwrap();
        assert_eq!(plan.truncate_steps(1), 1);
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.truncate_steps(5), 0);
    }

    #[test]
    fn test_plan_slot_serialization() {
        let slot = PlanSlot::Draft("not a plan".to_string());
        let json = serde_json::to_value(&slot).unwrap();
        assert_eq!(json["kind"], "draft");

        let back: PlanSlot = serde_json::from_value(json).unwrap();
        assert_eq!(back, slot);
        assert!(!back.is_structured());
    }
}
