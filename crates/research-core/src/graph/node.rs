use serde::{Deserialize, Serialize};
use std::fmt;

/// Workflow node identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeName {
    Coordinator,
    BackgroundInvestigator,
    Planner,
    HumanFeedback,
    ResearchTeam,
    Researcher,
    Coder,
    Reporter,
    /// Terminal marker; never executed
    End,
}

impl NodeName {
    pub const ALL: [NodeName; 9] = [
        NodeName::Coordinator,
        NodeName::BackgroundInvestigator,
        NodeName::Planner,
        NodeName::HumanFeedback,
        NodeName::ResearchTeam,
        NodeName::Researcher,
        NodeName::Coder,
        NodeName::Reporter,
        NodeName::End,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeName::Coordinator => "coordinator",
            NodeName::BackgroundInvestigator => "background_investigator",
            NodeName::Planner => "planner",
            NodeName::HumanFeedback => "human_feedback",
            NodeName::ResearchTeam => "research_team",
            NodeName::Researcher => "researcher",
            NodeName::Coder => "coder",
            NodeName::Reporter => "reporter",
            NodeName::End => "end",
        }
    }

    pub fn is_end(&self) -> bool {
        matches!(self, NodeName::End)
    }
}

impl fmt::Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
