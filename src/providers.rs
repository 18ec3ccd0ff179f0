//! Ollama-backed model bindings
//!
//! Every capability class resolves to the basic model unless a reasoning
//! model is configured, in which case the planner gets its own binding.

use research_core::{LLMProvider, LlmType, ProviderRegistry, RigAgentAdapter};
use rig::client::{CompletionClient, ProviderClient};
use rig::providers::ollama;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::Config;

/// Build the provider registry for the configured Ollama models
pub fn ollama_registry(config: &Config) -> ProviderRegistry {
    // rig's Ollama client reads its endpoint from the environment
    std::env::set_var("OLLAMA_API_BASE_URL", &config.ollama_host);
    let client = ollama::Client::from_env();

    debug!(host = %config.ollama_host, "Created Ollama client");

    let mut registry = ProviderRegistry::single(ollama_model(&client, &config.model, config.temperature));
    info!(model = %config.model, "Bound basic model");

    if let Some(reasoning) = &config.reasoning_model {
        registry = registry.with(LlmType::Reasoning, ollama_model(&client, reasoning, config.temperature));
        info!(model = %reasoning, "Bound reasoning model");
    }

    registry
}

fn ollama_model(client: &ollama::Client, model: &str, temperature: f64) -> Arc<dyn LLMProvider> {
    let agent = client.agent(model).temperature(temperature).build();
    Arc::new(RigAgentAdapter::with_names(agent, "ollama", model))
}
