//! Workflow state store
//!
//! - [`WorkflowState`]: the record threaded through every node
//! - [`StateDelta`]: validated changes produced by a node
//! - [`Plan`] / [`Step`]: structured research plan with monotonic step status

mod message;
mod plan;
mod workflow;

pub use message::{Message, Role, ToolCall};
pub use plan::{Plan, PlanParseError, PlanSlot, Resource, Step, StepStatus, StepType};
pub use workflow::{StateDelta, StepUpdate, WorkflowState};
