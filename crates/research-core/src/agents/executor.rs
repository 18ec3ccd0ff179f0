//! Reason-and-act loop
//!
//! A [`ReactAgent`] repeatedly calls its model with the tool definitions it
//! exposes, executes the requested tool calls in order, and feeds the results
//! back until the model answers without tool calls.

use std::sync::Arc;
use tracing::{debug, warn};

use super::prompt::{PromptContext, PromptTemplate};
use crate::error::AgentError;
use crate::llm::{AgentRole, LLMConfig, LLMProvider, LLMResponse, LlmType, TokenUsage};
use crate::state::{Message, Resource};
use crate::tools::{ToolContext, ToolDefinition, ToolSet};

/// Transformation applied to the conversation before every model call.
///
/// The system prompt is added after the hook runs, so hooks only see the
/// conversation itself.
pub type PreModelHook = Arc<dyn Fn(Vec<Message>) -> Vec<Message> + Send + Sync>;

/// Hook that keeps only the most recent `n` messages
pub fn keep_last_messages(n: usize) -> PreModelHook {
    Arc::new(move |messages: Vec<Message>| {
        let skip = messages.len().saturating_sub(n);
        messages.into_iter().skip(skip).collect()
    })
}

/// Result of one agent invocation
#[derive(Debug, Clone, Default)]
pub struct AgentRun {
    /// Final answer of the model
    pub output: String,
    /// Messages produced during the invocation (assistant and tool turns)
    pub messages: Vec<Message>,
    /// Sources reported by the tools that ran
    pub resources: Vec<Resource>,
    pub usage: TokenUsage,
}

pub struct ReactAgent {
    name: String,
    role: AgentRole,
    llm_type: LlmType,
    llm: Arc<dyn LLMProvider>,
    tools: ToolSet,
    template: PromptTemplate,
    context: PromptContext,
    pre_model_hook: Option<PreModelHook>,
    max_iterations: usize,
    llm_config: Option<LLMConfig>,
}

impl ReactAgent {
    pub fn new(
        name: impl Into<String>,
        role: AgentRole,
        llm: Arc<dyn LLMProvider>,
        template: PromptTemplate,
        context: PromptContext,
    ) -> Self {
        Self {
            name: name.into(),
            role,
            llm_type: LlmType::default(),
            llm,
            tools: ToolSet::new(),
            template,
            context,
            pre_model_hook: None,
            max_iterations: 10,
            llm_config: None,
        }
    }

    pub fn with_tools(mut self, tools: ToolSet) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_llm_type(mut self, llm_type: LlmType) -> Self {
        self.llm_type = llm_type;
        self
    }

    pub fn with_pre_model_hook(mut self, hook: Option<PreModelHook>) -> Self {
        self.pre_model_hook = hook;
        self
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_llm_config(mut self, config: Option<LLMConfig>) -> Self {
        self.llm_config = config;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> AgentRole {
        self.role
    }

    pub fn llm_type(&self) -> LlmType {
        self.llm_type
    }

    pub fn tools(&self) -> &ToolSet {
        &self.tools
    }

    pub fn system_prompt(&self) -> String {
        self.template.render(&self.context)
    }

    fn prepare(&self, conversation: &[Message]) -> Vec<Message> {
        let conversation = match &self.pre_model_hook {
            Some(hook) => hook(conversation.to_vec()),
            None => conversation.to_vec(),
        };
        let mut request = Vec::with_capacity(conversation.len() + 1);
        request.push(Message::system(&self.system_prompt()));
        request.extend(conversation);
        request
    }

    /// Run the loop until the model stops requesting tools
    pub async fn invoke(&self, input: Vec<Message>, ctx: &ToolContext) -> Result<AgentRun, AgentError> {
        let definitions = self.tools.definitions();
        let mut conversation = input;
        let start = conversation.len();
        let mut resources = Vec::new();
        let mut usage = TokenUsage::default();

        for iteration in 0..self.max_iterations {
            debug!(agent = %self.name, iteration, "Agent iteration");

            let request = self.prepare(&conversation);
            let response = self
                .llm
                .complete(&request, &definitions, self.llm_config.as_ref())
                .await?;
            if let Some(u) = response.usage {
                usage += u;
            }

            let message = response.message.with_name(&self.name);
            let calls = message.tool_calls.clone().unwrap_or_default();
            conversation.push(message);

            if calls.is_empty() {
                let output = conversation
                    .last()
                    .map(|m| m.content.clone())
                    .unwrap_or_default();
                return Ok(AgentRun {
                    output,
                    messages: conversation.split_off(start),
                    resources,
                    usage,
                });
            }

            for call in calls {
                let Some(tool) = self.tools.get(&call.name) else {
                    warn!(agent = %self.name, tool = %call.name, "Model requested unknown tool");
                    conversation.push(Message::tool(&format!("Unknown tool: {}", call.name), &call.id));
                    continue;
                };

                debug!(agent = %self.name, tool = %call.name, tool_call_id = %call.id, "Executing tool call");
                let output = tool
                    .invoke(call.arguments.clone(), &ctx.for_call(&call.id))
                    .await
                    .map_err(|e| AgentError::from_tool(&call.name, e))?;

                resources.extend(output.resources);
                conversation.push(Message::tool(&output.content, &call.id));
            }
        }

        Err(AgentError::MaxIterations(self.max_iterations))
    }

    /// Single model call offering declaration-only signals.
    ///
    /// The signals are never executed; the caller inspects the returned tool
    /// calls to decide what to do next.
    pub async fn decide(&self, input: Vec<Message>, signals: &[ToolDefinition]) -> Result<LLMResponse, AgentError> {
        let request = self.prepare(&input);
        let response = self
            .llm
            .complete(&request, signals, self.llm_config.as_ref())
            .await?;
        Ok(response)
    }
}

impl std::fmt::Debug for ReactAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactAgent")
            .field("name", &self.name)
            .field("role", &self.role)
            .field("llm_type", &self.llm_type)
            .field("provider", &self.llm.name())
            .field("tools", &self.tools)
            .field("max_iterations", &self.max_iterations)
            .finish()
    }
}
