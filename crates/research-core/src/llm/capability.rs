//! Role to capability-class dispatch
//!
//! Agents are bound to models in two hops: an [`AgentRole`] resolves to an
//! [`LlmType`] through the [`CapabilityMap`], and the LLM type resolves to a
//! concrete provider through the [`ProviderRegistry`]. Both hops degrade to
//! the basic class with a warning instead of failing agent construction.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

use super::provider::LLMProvider;
use crate::error::AgentError;

/// Agent role in the research workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Coordinator,
    Planner,
    Researcher,
    Coder,
    Reporter,
    BackgroundInvestigator,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Coordinator => "coordinator",
            AgentRole::Planner => "planner",
            AgentRole::Researcher => "researcher",
            AgentRole::Coder => "coder",
            AgentRole::Reporter => "reporter",
            AgentRole::BackgroundInvestigator => "background_investigator",
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability class a model binding provides
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmType {
    #[default]
    Basic,
    Reasoning,
    Code,
    Vision,
}

impl fmt::Display for LlmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LlmType::Basic => "basic",
            LlmType::Reasoning => "reasoning",
            LlmType::Code => "code",
            LlmType::Vision => "vision",
        };
        f.write_str(s)
    }
}

/// Role to capability-class mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityMap {
    entries: HashMap<AgentRole, LlmType>,
    /// Used for roles without an entry
    #[serde(default)]
    default: LlmType,
}

impl Default for CapabilityMap {
    fn default() -> Self {
        Self::empty()
            .with(AgentRole::Coordinator, LlmType::Basic)
            .with(AgentRole::Planner, LlmType::Reasoning)
            .with(AgentRole::Researcher, LlmType::Basic)
            .with(AgentRole::Coder, LlmType::Basic)
            .with(AgentRole::Reporter, LlmType::Reasoning)
    }
}

impl CapabilityMap {
    /// Map with no entries; every role falls back to the default class
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
            default: LlmType::Basic,
        }
    }

    pub fn with(mut self, role: AgentRole, llm_type: LlmType) -> Self {
        self.entries.insert(role, llm_type);
        self
    }

    pub fn with_default(mut self, llm_type: LlmType) -> Self {
        self.default = llm_type;
        self
    }

    pub fn contains(&self, role: AgentRole) -> bool {
        self.entries.contains_key(&role)
    }

    /// Resolve a role, falling back to the default class when unmapped
    pub fn resolve(&self, role: AgentRole) -> LlmType {
        match self.entries.get(&role) {
            Some(llm_type) => *llm_type,
            None => {
                warn!(
                    role = %role,
                    fallback = %self.default,
                    "Role has no capability mapping, falling back to default LLM type"
                );
                self.default
            }
        }
    }
}

/// Concrete providers bound per capability class
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<LlmType, Arc<dyn LLMProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind one provider to every capability class
    pub fn single(provider: Arc<dyn LLMProvider>) -> Self {
        Self::new().with(LlmType::Basic, provider)
    }

    pub fn with(mut self, llm_type: LlmType, provider: Arc<dyn LLMProvider>) -> Self {
        self.providers.insert(llm_type, provider);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Provider for a class, falling back to the basic binding
    pub fn resolve(&self, llm_type: LlmType) -> Result<Arc<dyn LLMProvider>, AgentError> {
        if let Some(provider) = self.providers.get(&llm_type) {
            return Ok(Arc::clone(provider));
        }
        let fallback = self.providers.get(&LlmType::Basic).ok_or_else(|| {
            AgentError::Configuration(format!(
                "no provider bound for '{}' and no basic fallback",
                llm_type
            ))
        })?;
        if llm_type != LlmType::Basic {
            warn!(llm_type = %llm_type, "No provider bound, using basic provider");
        }
        Ok(Arc::clone(fallback))
    }

    /// Model names of the bound providers, sorted
    pub fn models(&self) -> Vec<String> {
        let mut models: Vec<String> = self
            .providers
            .values()
            .map(|p| p.default_model().to_string())
            .collect();
        models.sort();
        models.dedup();
        models
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bound: Vec<String> = self
            .providers
            .iter()
            .map(|(t, p)| format!("{}={}", t, p.name()))
            .collect();
        f.debug_struct("ProviderRegistry").field("bound", &bound).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::llm::{LLMConfig, LLMResponse};
    use crate::state::Message;
    use crate::tools::ToolDefinition;
    use async_trait::async_trait;

    struct NamedProvider(&'static str);

    #[async_trait]
    impl LLMProvider for NamedProvider {
        async fn complete(
            &self,
            _messages: &[Message],
            _tools: &[ToolDefinition],
            _config: Option<&LLMConfig>,
        ) -> Result<LLMResponse, LlmError> {
            Ok(LLMResponse::new(Message::assistant(self.0)))
        }

        fn name(&self) -> &str {
            self.0
        }

        fn default_model(&self) -> &str {
            self.0
        }
    }

    #[test]
    fn test_default_mapping() {
        let map = CapabilityMap::default();
        assert_eq!(map.resolve(AgentRole::Planner), LlmType::Reasoning);
        assert_eq!(map.resolve(AgentRole::Researcher), LlmType::Basic);
        assert!(!map.contains(AgentRole::BackgroundInvestigator));
    }

    #[test]
    fn test_unmapped_role_falls_back_to_default() {
        let map = CapabilityMap::empty().with_default(LlmType::Code);
        assert_eq!(map.resolve(AgentRole::Reporter), LlmType::Code);
        assert_eq!(
            CapabilityMap::default().resolve(AgentRole::BackgroundInvestigator),
            LlmType::Basic
        );
    }

    #[test]
    fn test_capability_map_deserializes_partial_config() {
        let map: CapabilityMap =
            serde_json::from_str(r#"{"entries": {"planner": "reasoning"}}"#).unwrap();
        assert_eq!(map.resolve(AgentRole::Planner), LlmType::Reasoning);
        assert_eq!(map.resolve(AgentRole::Coder), LlmType::Basic);
    }

    #[test]
    fn test_registry_falls_back_to_basic() {
        let registry = ProviderRegistry::new()
            .with(LlmType::Basic, Arc::new(NamedProvider("small")))
            .with(LlmType::Reasoning, Arc::new(NamedProvider("large")));

        assert_eq!(registry.resolve(LlmType::Reasoning).unwrap().name(), "large");
        assert_eq!(registry.resolve(LlmType::Vision).unwrap().name(), "small");
        assert_eq!(registry.models(), vec!["large".to_string(), "small".to_string()]);
    }

    #[test]
    fn test_empty_registry_is_a_configuration_error() {
        let err = ProviderRegistry::new().resolve(LlmType::Basic).err().unwrap();
        assert!(matches!(err, AgentError::Configuration(_)));
    }
}
