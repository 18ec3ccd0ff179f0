//! Workflow graph: node identifiers, routing table and the engine that
//! drives a run through them.

mod engine;
mod node;
mod transitions;

pub use engine::{
    DynNode, EngineOutcome, EventSender, Execution, GraphEngine, Node, NodeContext, NodeOutput, RunEvent,
};
pub use node::NodeName;
pub use transitions::{Guard, Transition, TransitionTable};
