//! Rig agent as an [`LLMProvider`]
//!
//! The research agents run their own tool loop so that calls can be
//! intercepted and recorded, which rules out Rig's prompt loop. Only a
//! single completion is requested per call: tool definitions go out, tool
//! call requests come back unexecuted.
//!
//! Rig's typed [`CompletionError`] is folded into the [`LlmError`] retry
//! taxonomy here, so nodes never see provider-specific failures.

use async_trait::async_trait;
use std::sync::Arc;

use rig::agent::Agent;
use rig::completion::{Completion, CompletionError, CompletionModel, Message as RigMessage};
use rig::http_client;
use rig::message::AssistantContent;
use rig::OneOrMany;
use tracing::debug;

use crate::error::LlmError;
use crate::llm::{LLMConfig, LLMProvider, LLMResponse, TokenUsage};
use crate::state::{Message, Role, ToolCall};
use crate::tools::ToolDefinition;

/// Wraps a Rig `Agent<M>` so it can back any capability class
pub struct RigAgentAdapter<M>
where
    M: CompletionModel + Send + Sync,
{
    agent: Arc<Agent<M>>,
    provider_name: String,
    model_name: String,
}

impl<M> RigAgentAdapter<M>
where
    M: CompletionModel + Send + Sync,
{
    pub fn new(agent: Agent<M>) -> Self {
        Self::with_names(agent, "rig", "rig-agent")
    }

    /// Adapter with provider/model names used in logs and health output
    pub fn with_names(agent: Agent<M>, provider_name: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            agent: Arc::new(agent),
            provider_name: provider_name.into(),
            model_name: model_name.into(),
        }
    }

    /// Agent preamble followed by the role prompt of the research agent
    fn preamble(&self, system: Option<String>) -> Option<String> {
        match (self.agent.preamble.as_deref(), system) {
            (Some(own), Some(role)) => Some(format!("{}\n\n{}", own, role)),
            (None, role) => role,
            (Some(_), None) => None,
        }
    }
}

#[async_trait]
impl<M> LLMProvider for RigAgentAdapter<M>
where
    M: CompletionModel + Send + Sync + 'static,
{
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        config: Option<&LLMConfig>,
    ) -> Result<LLMResponse, LlmError> {
        let request = RigRequest::from_messages(messages);
        let mut builder = self
            .agent
            .completion(request.prompt, request.history)
            .await
            .map_err(classify_error)?;

        if let Some(preamble) = self.preamble(request.system) {
            builder = builder.preamble(preamble);
        }
        if let Some(temperature) = config.and_then(|c| c.temperature) {
            builder = builder.temperature(temperature);
        }
        if let Some(max_tokens) = config.and_then(|c| c.max_tokens) {
            builder = builder.max_tokens(max_tokens);
        }
        if !tools.is_empty() {
            builder = builder.tools(
                tools
                    .iter()
                    .map(|t| rig::completion::ToolDefinition {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: t.parameters.clone(),
                    })
                    .collect(),
            );
        }

        let response = builder.send().await.map_err(classify_error)?;
        let message = reply_message(&response.choice);
        debug!(
            provider = %self.provider_name,
            model = %self.model_name,
            tool_calls = message.tool_calls.as_ref().map_or(0, Vec::len),
            "Completion received"
        );

        let usage = TokenUsage::from_rig_usage(&response.usage);
        Ok(match usage.total_tokens {
            0 => LLMResponse::new(message),
            _ => LLMResponse::new(message).with_usage(usage),
        })
    }

    fn name(&self) -> &str {
        &self.provider_name
    }

    fn default_model(&self) -> &str {
        &self.model_name
    }
}

impl<M> std::fmt::Debug for RigAgentAdapter<M>
where
    M: CompletionModel + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RigAgentAdapter")
            .field("provider_name", &self.provider_name)
            .field("model_name", &self.model_name)
            .finish()
    }
}

/// Map a Rig failure onto the retry taxonomy.
///
/// Transport failures, 429 and 5xx are transient. An answer Rig could not
/// decode is malformed output, which the planner spends its repair budget on.
fn classify_error(err: CompletionError) -> LlmError {
    match err {
        CompletionError::JsonError(e) => LlmError::MalformedOutput(e.to_string()),
        CompletionError::ResponseError(text) => LlmError::MalformedOutput(text),
        CompletionError::HttpError(e) => classify_http(e),
        CompletionError::ProviderError(text) if is_overload(&text) => LlmError::Transient(text),
        other => LlmError::Provider(other.to_string()),
    }
}

fn classify_http(err: http_client::Error) -> LlmError {
    let status = match &err {
        http_client::Error::InvalidStatusCode(status) => Some(status.as_u16()),
        http_client::Error::InvalidStatusCodeWithMessage(status, _) => Some(status.as_u16()),
        _ => None,
    };
    match status {
        Some(429) | Some(500..=599) | None => LlmError::Transient(err.to_string()),
        Some(_) => LlmError::Provider(err.to_string()),
    }
}

/// Providers that report overload in the error body instead of the status
fn is_overload(text: &str) -> bool {
    let lower = text.to_lowercase();
    ["rate limit", "overloaded", "timed out", "temporarily unavailable"]
        .iter()
        .any(|needle| lower.contains(needle))
}

/// A research-agent conversation split the way Rig's completion API wants it
struct RigRequest {
    system: Option<String>,
    history: Vec<RigMessage>,
    prompt: RigMessage,
}

impl RigRequest {
    fn from_messages(messages: &[Message]) -> Self {
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == Role::System && !m.content.trim().is_empty())
            .map(|m| m.content.as_str())
            .collect();

        let mut history: Vec<RigMessage> = messages
            .iter()
            .filter_map(|m| match m.role {
                Role::System => None,
                Role::User => Some(RigMessage::user(m.content.clone())),
                Role::Assistant => Some(assistant_turn(m)),
                // Unpaired tool results are attributed to the tool by name
                Role::Tool => Some(RigMessage::tool_result(
                    m.tool_call_id.clone().or_else(|| m.name.clone()).unwrap_or_default(),
                    m.content.clone(),
                )),
            })
            .collect();

        let prompt = history.pop().unwrap_or_else(|| RigMessage::user(""));
        Self {
            system: (!system.is_empty()).then(|| system.join("\n\n")),
            history,
            prompt,
        }
    }
}

/// Replay an earlier assistant turn, including the calls it requested
fn assistant_turn(message: &Message) -> RigMessage {
    let text = (!message.content.is_empty()).then(|| AssistantContent::text(message.content.clone()));
    let calls = message
        .tool_calls
        .iter()
        .flatten()
        .map(|c| AssistantContent::tool_call(c.id.clone(), c.name.clone(), c.arguments.clone()));

    let content = OneOrMany::many(text.into_iter().chain(calls))
        .unwrap_or_else(|_| OneOrMany::one(AssistantContent::text("")));
    RigMessage::Assistant { id: None, content }
}

/// Collapse a Rig choice into one assistant message. Reasoning and image
/// parts are dropped; only text reaches the workflow state.
fn reply_message(choice: &OneOrMany<AssistantContent>) -> Message {
    let mut text = String::new();
    let mut calls = Vec::new();

    for item in choice.iter() {
        match item {
            AssistantContent::Text(t) => text.push_str(&t.text),
            AssistantContent::ToolCall(call) => calls.push(ToolCall {
                id: call.id.clone(),
                name: call.function.name.clone(),
                arguments: object_arguments(call.function.arguments.clone()),
            }),
            AssistantContent::Reasoning(_) | AssistantContent::Image(_) => {}
        }
    }

    if calls.is_empty() {
        Message::assistant(&text)
    } else {
        Message::assistant_with_tool_calls(&text, calls)
    }
}

/// Some local models send tool arguments as a JSON-encoded string; tools
/// deserialize an object.
fn object_arguments(arguments: serde_json::Value) -> serde_json::Value {
    match &arguments {
        serde_json::Value::String(raw) => match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(parsed @ serde_json::Value::Object(_)) => parsed,
            _ => arguments,
        },
        _ => arguments,
    }
}
