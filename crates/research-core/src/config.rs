//! Run configuration
//!
//! Options recognized per run, plus the retry policy applied at node
//! boundaries. Configuration is read-only for the duration of a run and is
//! persisted with every checkpoint so a resumed run behaves the same way.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::WorkflowError;
use crate::state::WorkflowState;

/// Writing style of the final report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStyle {
    #[default]
    Academic,
    PopularScience,
    News,
    SocialMedia,
    Investment,
}

impl ReportStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStyle::Academic => "academic",
            ReportStyle::PopularScience => "popular_science",
            ReportStyle::News => "news",
            ReportStyle::SocialMedia => "social_media",
            ReportStyle::Investment => "investment",
        }
    }
}

impl fmt::Display for ReportStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReportStyle {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "academic" => Ok(ReportStyle::Academic),
            "popular_science" => Ok(ReportStyle::PopularScience),
            "news" => Ok(ReportStyle::News),
            "social_media" | "social" => Ok(ReportStyle::SocialMedia),
            "investment" => Ok(ReportStyle::Investment),
            other => Err(WorkflowError::Config(format!("unknown report style '{}'", other))),
        }
    }
}

/// Per-run workflow configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Maximum number of steps kept from a plan
    pub max_step_num: usize,

    /// Upper bound on planning rounds
    pub max_plan_iterations: u32,

    pub enable_clarification: bool,

    /// Clarification questions the coordinator may ask
    pub max_clarification_rounds: u32,

    pub enable_background_investigation: bool,

    /// When false, execution suspends for human plan review
    pub auto_accept_plan: bool,

    pub locale: String,

    pub report_style: ReportStyle,

    pub max_search_results: usize,

    /// Tool names that suspend the run before they execute
    #[serde(default)]
    pub interrupt_before_tools: Vec<String>,

    /// Planner attempts before falling back to a best-effort report
    pub planner_retry_budget: u32,

    /// Reason-and-act iterations allowed per agent invocation
    pub max_agent_iterations: usize,

    /// Node transitions allowed per run
    pub recursion_limit: usize,

    /// Timeout for a single agent invocation
    #[serde(with = "humantime_serde")]
    pub node_timeout: Duration,

    pub retry_policy: RetryPolicy,

    /// Pre-seeded state; query and locale fields are still set by the runner
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_state: Option<WorkflowState>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_step_num: 5,
            max_plan_iterations: 1,
            enable_clarification: false,
            max_clarification_rounds: 3,
            enable_background_investigation: true,
            auto_accept_plan: true,
            locale: "en-US".to_string(),
            report_style: ReportStyle::default(),
            max_search_results: 3,
            interrupt_before_tools: Vec::new(),
            planner_retry_budget: 3,
            max_agent_iterations: 10,
            recursion_limit: 50,
            node_timeout: Duration::from_secs(300),
            retry_policy: RetryPolicy::default(),
            initial_state: None,
        }
    }
}

impl RunConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_step_num(mut self, max: usize) -> Self {
        self.max_step_num = max;
        self
    }

    pub fn with_max_plan_iterations(mut self, max: u32) -> Self {
        self.max_plan_iterations = max;
        self
    }

    pub fn with_clarification(mut self, enabled: bool) -> Self {
        self.enable_clarification = enabled;
        self
    }

    pub fn with_max_clarification_rounds(mut self, rounds: u32) -> Self {
        self.max_clarification_rounds = rounds;
        self
    }

    pub fn with_background_investigation(mut self, enabled: bool) -> Self {
        self.enable_background_investigation = enabled;
        self
    }

    pub fn with_auto_accept_plan(mut self, auto_accept: bool) -> Self {
        self.auto_accept_plan = auto_accept;
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    pub fn with_report_style(mut self, style: ReportStyle) -> Self {
        self.report_style = style;
        self
    }

    pub fn with_max_search_results(mut self, max: usize) -> Self {
        self.max_search_results = max.max(1);
        self
    }

    pub fn with_interrupt_before_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.interrupt_before_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_planner_retry_budget(mut self, budget: u32) -> Self {
        self.planner_retry_budget = budget.max(1);
        self
    }

    pub fn with_max_agent_iterations(mut self, max: usize) -> Self {
        self.max_agent_iterations = max;
        self
    }

    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }

    pub fn with_node_timeout(mut self, timeout: Duration) -> Self {
        self.node_timeout = timeout;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_initial_state(mut self, state: WorkflowState) -> Self {
        self.initial_state = Some(state);
        self
    }

    /// Reject configurations the graph cannot run with
    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.max_step_num == 0 {
            return Err(WorkflowError::Config("max_step_num must be at least 1".into()));
        }
        if self.max_plan_iterations == 0 {
            return Err(WorkflowError::Config("max_plan_iterations must be at least 1".into()));
        }
        if self.recursion_limit == 0 {
            return Err(WorkflowError::Config("recursion_limit must be at least 1".into()));
        }
        if self.locale.trim().is_empty() {
            return Err(WorkflowError::Config("locale must not be empty".into()));
        }
        Ok(())
    }

    /// Whether the coordinator may still ask a clarification question
    pub fn clarification_allowed(&self, rounds_so_far: u32) -> bool {
        self.enable_clarification && rounds_so_far < self.max_clarification_rounds
    }
}

/// Retry policy for transient failures at the node boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// Base delay for exponential backoff
    #[serde(with = "humantime_serde")]
    pub backoff_base: Duration,

    /// Maximum delay between retries
    #[serde(with = "humantime_serde")]
    pub backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_base: Duration::from_millis(100),
            backoff_max: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    pub fn with_backoff_max(mut self, max: Duration) -> Self {
        self.backoff_max = max;
        self
    }

    /// Delay before retry number `attempt` (0-based), exponential and capped
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = 2u32.saturating_pow(attempt);
        self.backoff_base.saturating_mul(multiplier).min(self.backoff_max)
    }

    /// Whether another retry is allowed after `retries` retries
    pub fn should_retry(&self, retries: u32) -> bool {
        retries < self.max_retries
    }

    pub fn no_retry() -> Self {
        Self::new(0)
    }
}
