//! Bindings to the Rig framework
//!
//! [`RigAgentAdapter`] lets any Rig completion model (Ollama, OpenAI,
//! Anthropic, ...) serve as a capability provider for the research agents.

mod rig_agent_adapter;

pub use rig_agent_adapter::RigAgentAdapter;
