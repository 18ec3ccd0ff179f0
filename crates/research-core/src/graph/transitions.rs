//! Typed transition table
//!
//! ```text
//!  coordinator ──▶ background_investigator ──▶ planner
//!       └──────────────────────────────────────▶ │
//!                                                ▼
//!         ┌──────────── human_feedback ◀── planner ──▶ reporter ──▶ END
//!         │  (edit/reject)     │ approve       │             ▲
//!         ▼                    ▼               ▼             │
//!      planner           research_team ◀──────┘             │
//!                          │      ▲  │                       │
//!               researcher ◀┘     │  └── no pending step ────┘
//!               coder ◀───────────┘
//! ```
//!
//! Rows are evaluated in order and the first matching guard wins, so each
//! source node lists its specific rows before its fallback.

use crate::config::RunConfig;
use crate::state::{StepType, WorkflowState};

use super::NodeName;

/// Predicate over the state after the source node ran
pub type Guard = fn(&WorkflowState, &RunConfig) -> bool;

#[derive(Clone, Copy)]
pub struct Transition {
    pub from: NodeName,
    pub guard: Guard,
    pub to: NodeName,
    /// Condition description used in diagrams and logs
    pub label: &'static str,
}

impl std::fmt::Debug for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transition")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("label", &self.label)
            .finish()
    }
}

fn always(_: &WorkflowState, _: &RunConfig) -> bool {
    true
}

fn background_enabled(_: &WorkflowState, config: &RunConfig) -> bool {
    config.enable_background_investigation
}

fn plan_unusable(state: &WorkflowState, _: &RunConfig) -> bool {
    !state.current_plan.is_structured()
}

fn enough_context(state: &WorkflowState, _: &RunConfig) -> bool {
    state.has_enough_context()
}

fn needs_review(state: &WorkflowState, _: &RunConfig) -> bool {
    !state.auto_accepted_plan
}

fn plan_approved(state: &WorkflowState, _: &RunConfig) -> bool {
    state.plan_approved
}

fn replan_budget_spent(state: &WorkflowState, config: &RunConfig) -> bool {
    state.plan_iterations >= config.max_plan_iterations
}

fn active_step_is(state: &WorkflowState, step_type: StepType) -> bool {
    state
        .current_plan
        .plan()
        .and_then(|plan| plan.active_step().map(|i| plan.steps[i].step_type))
        == Some(step_type)
}

fn research_step_active(state: &WorkflowState, _: &RunConfig) -> bool {
    active_step_is(state, StepType::Research)
}

fn processing_step_active(state: &WorkflowState, _: &RunConfig) -> bool {
    active_step_is(state, StepType::Processing)
}

#[derive(Debug, Clone)]
pub struct TransitionTable {
    rows: Vec<Transition>,
}

impl TransitionTable {
    pub fn new(rows: Vec<Transition>) -> Self {
        Self { rows }
    }

    /// The research workflow
    pub fn research() -> Self {
        use NodeName::*;

        let row = |from, guard: Guard, to, label| Transition { from, guard, to, label };

        Self::new(vec![
            row(Coordinator, background_enabled, BackgroundInvestigator, "background investigation enabled"),
            row(Coordinator, always, Planner, "otherwise"),
            row(BackgroundInvestigator, always, Planner, "always"),
            row(Planner, plan_unusable, Reporter, "no structured plan"),
            row(Planner, enough_context, Reporter, "has enough context"),
            row(Planner, needs_review, HumanFeedback, "plan needs review"),
            row(Planner, always, ResearchTeam, "plan auto-accepted"),
            row(HumanFeedback, plan_approved, ResearchTeam, "approved"),
            row(HumanFeedback, replan_budget_spent, ResearchTeam, "plan iterations exhausted"),
            row(HumanFeedback, always, Planner, "edit or reject"),
            row(ResearchTeam, research_step_active, Researcher, "research step"),
            row(ResearchTeam, processing_step_active, Coder, "processing step"),
            row(ResearchTeam, always, Reporter, "no pending step"),
            row(Researcher, always, ResearchTeam, "always"),
            row(Coder, always, ResearchTeam, "always"),
            row(Reporter, always, End, "always"),
        ])
    }

    pub fn rows(&self) -> &[Transition] {
        &self.rows
    }

    /// First matching row out of `from`
    pub fn next(&self, from: NodeName, state: &WorkflowState, config: &RunConfig) -> Option<&Transition> {
        self.rows
            .iter()
            .filter(|t| t.from == from)
            .find(|t| (t.guard)(state, config))
    }

    pub fn to_mermaid(&self) -> String {
        let mut out = String::from("graph TD\n");
        for t in &self.rows {
            out.push_str(&format!("    {} -->|{}| {}\n", t.from, t.label, t.to));
        }
        out
    }
}

impl Default for TransitionTable {
    fn default() -> Self {
        Self::research()
    }
}
