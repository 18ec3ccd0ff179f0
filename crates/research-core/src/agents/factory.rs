//! Agent construction from role specifications

use std::sync::Arc;
use tracing::debug;

use super::executor::{PreModelHook, ReactAgent};
use super::prompt::{PromptContext, PromptTemplate};
use crate::error::AgentError;
use crate::llm::{AgentRole, CapabilityMap, LLMConfig, ProviderRegistry};
use crate::tools::{intercept_tools, ToolSet};

/// What to build: role, template, tools and optional hooks
///
/// ```rust,ignore
/// let spec = AgentSpec::new("coder", AgentRole::Coder, PromptTemplate::Coder)
///     .with_tools(coder_tools)
///     .with_interrupt_before(["python_repl"]);
/// let agent = factory.create(spec, context, 10)?;
/// ```
#[derive(Clone)]
pub struct AgentSpec {
    pub name: String,
    pub role: AgentRole,
    pub template: PromptTemplate,
    pub tools: ToolSet,
    pub pre_model_hook: Option<PreModelHook>,
    pub interrupt_before: Vec<String>,
}

impl AgentSpec {
    pub fn new(name: impl Into<String>, role: AgentRole, template: PromptTemplate) -> Self {
        Self {
            name: name.into(),
            role,
            template,
            tools: ToolSet::new(),
            pre_model_hook: None,
            interrupt_before: Vec::new(),
        }
    }

    pub fn with_tools(mut self, tools: ToolSet) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_pre_model_hook(mut self, hook: PreModelHook) -> Self {
        self.pre_model_hook = Some(hook);
        self
    }

    pub fn with_interrupt_before<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.interrupt_before = tools.into_iter().map(Into::into).collect();
        self
    }
}

/// Builds agents by resolving roles to providers
#[derive(Debug, Clone)]
pub struct AgentFactory {
    capabilities: CapabilityMap,
    providers: ProviderRegistry,
    llm_config: Option<LLMConfig>,
}

impl AgentFactory {
    pub fn new(capabilities: CapabilityMap, providers: ProviderRegistry) -> Self {
        Self {
            capabilities,
            providers,
            llm_config: None,
        }
    }

    pub fn with_llm_config(mut self, config: LLMConfig) -> Self {
        self.llm_config = Some(config);
        self
    }

    pub fn capabilities(&self) -> &CapabilityMap {
        &self.capabilities
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// Build an agent.
    ///
    /// Fails only when no provider at all can serve the role.
    pub fn create(
        &self,
        spec: AgentSpec,
        context: PromptContext,
        max_iterations: usize,
    ) -> Result<ReactAgent, AgentError> {
        let llm_type = self.capabilities.resolve(spec.role);
        let llm = self.providers.resolve(llm_type)?;

        let tools = if spec.interrupt_before.is_empty() {
            spec.tools
        } else {
            intercept_tools(&spec.tools, &spec.interrupt_before)
        };

        debug!(
            agent = %spec.name,
            role = %spec.role,
            llm_type = %llm_type,
            provider = llm.name(),
            tools = ?tools.names(),
            "Creating agent"
        );

        Ok(ReactAgent::new(spec.name, spec.role, Arc::clone(&llm), spec.template, context)
            .with_llm_type(llm_type)
            .with_tools(tools)
            .with_pre_model_hook(spec.pre_model_hook)
            .with_max_iterations(max_iterations)
            .with_llm_config(self.llm_config.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{LlmError, ToolError};
    use crate::llm::{LLMProvider, LLMResponse, LlmType};
    use crate::state::Message;
    use crate::tools::{ReviewLedger, Tool, ToolContext, ToolDefinition, ToolOutput};
    use async_trait::async_trait;
    use serde_json::json;

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

    struct Repl;

    #[async_trait]
    impl Tool for Repl {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "python_repl".to_string(),
                description: "run python".to_string(),
                parameters: json!({"type": "object"}),
            }
        }

        async fn invoke(&self, _args: serde_json::Value, _ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
            Ok(ToolOutput::text("42"))
        }
    }

    fn factory() -> AgentFactory {
        let providers = ProviderRegistry::new()
            .with(LlmType::Basic, Arc::new(NamedProvider("basic")))
            .with(LlmType::Reasoning, Arc::new(NamedProvider("reasoning")));
        AgentFactory::new(CapabilityMap::default(), providers)
    }

    fn context() -> PromptContext {
        PromptContext::new("en-US", "topic")
    }

    #[tokio::test]
    async fn test_role_resolves_to_capability_class() {
        let planner = factory()
            .create(AgentSpec::new("planner", AgentRole::Planner, PromptTemplate::Planner), context(), 3)
            .unwrap();
        assert_eq!(planner.llm_type(), LlmType::Reasoning);

        let run = planner
            .invoke(vec![Message::user("plan")], &ToolContext::new("r", Arc::new(ReviewLedger::new())))
            .await
            .unwrap();
        assert_eq!(run.output, "reasoning");
    }

    #[test]
    fn test_unmapped_role_degrades_to_default() {
        let factory = AgentFactory::new(
            CapabilityMap::empty(),
            ProviderRegistry::single(Arc::new(NamedProvider("basic"))),
        );

        let agent = factory
            .create(AgentSpec::new("reporter", AgentRole::Reporter, PromptTemplate::Reporter), context(), 3)
            .unwrap();
        assert_eq!(agent.llm_type(), LlmType::Basic);
    }

    #[test]
    fn test_no_providers_is_a_configuration_error() {
        let factory = AgentFactory::new(CapabilityMap::default(), ProviderRegistry::new());
        let err = factory
            .create(AgentSpec::new("coder", AgentRole::Coder, PromptTemplate::Coder), context(), 3)
            .unwrap_err();
        assert!(matches!(err, AgentError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_interrupt_list_wraps_tools() {
        let spec = AgentSpec::new("coder", AgentRole::Coder, PromptTemplate::Coder)
            .with_tools(ToolSet::new().with(Arc::new(Repl)))
            .with_interrupt_before(["python_repl"]);
        let agent = factory().create(spec, context(), 3).unwrap();

        let ctx = ToolContext::new("r", Arc::new(ReviewLedger::new())).for_call("c1");
        let result = agent.tools().get("python_repl").unwrap().invoke(json!({}), &ctx).await;
        assert!(matches!(result, Err(ToolError::Interrupted(_))));
    }
}
