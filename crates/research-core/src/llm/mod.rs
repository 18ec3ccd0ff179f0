//! LLM capability providers
//!
//! ```text
//! AgentRole --CapabilityMap--> LlmType --ProviderRegistry--> Arc<dyn LLMProvider>
//!                                                                  |
//!                                                   RigAgentAdapter (rig Agent<M>)
//! ```
//!
//! ```rust,ignore
//! use rig::client::{CompletionClient, ProviderClient};
//! use rig::providers::ollama;
//! use research_core::compat::RigAgentAdapter;
//! use research_core::llm::{LlmType, ProviderRegistry};
//!
//! let client = ollama::Client::from_env();
//! let basic = RigAgentAdapter::new(client.agent("qwen2.5").build());
//! let registry = ProviderRegistry::new().with(LlmType::Basic, Arc::new(basic));
//! ```

mod capability;
mod config;
mod provider;

pub use capability::{AgentRole, CapabilityMap, LlmType, ProviderRegistry};
pub use config::{LLMConfig, TokenUsage};
pub use provider::{LLMProvider, LLMResponse, LLMResponseStream, MessageChunk};
