//! Agents: prompt rendering, construction and the reason-and-act loop

mod executor;
mod factory;
mod prompt;

pub use executor::{keep_last_messages, AgentRun, PreModelHook, ReactAgent};
pub use factory::{AgentFactory, AgentSpec};
pub use prompt::{PromptContext, PromptTemplate};
