//! LLM provider trait
//!
//! Providers are stateless capability bindings shared by every run.
//! Implementations must be safe for concurrent use.

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use super::config::{LLMConfig, TokenUsage};
use crate::error::LlmError;
use crate::state::Message;
use crate::tools::ToolDefinition;

/// Completion response
#[derive(Debug, Clone)]
pub struct LLMResponse {
    /// Assistant message, possibly carrying tool call requests
    pub message: Message,
    pub usage: Option<TokenUsage>,
}

impl LLMResponse {
    pub fn new(message: Message) -> Self {
        Self { message, usage: None }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// Streaming response chunk
#[derive(Debug, Clone)]
pub struct MessageChunk {
    pub content: String,
    pub is_final: bool,
    /// Typically only present on the final chunk
    pub usage: Option<TokenUsage>,
}

/// Boxed stream of message chunks
pub struct LLMResponseStream {
    inner: Pin<Box<dyn Stream<Item = Result<MessageChunk, LlmError>> + Send>>,
}

impl LLMResponseStream {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<MessageChunk, LlmError>> + Send + 'static,
    {
        Self {
            inner: Box::pin(stream),
        }
    }

    /// Single-chunk stream for providers without native streaming
    pub fn from_complete(response: LLMResponse) -> Self {
        let chunk = MessageChunk {
            content: response.message.content,
            is_final: true,
            usage: response.usage,
        };
        Self::new(futures::stream::once(async move { Ok(chunk) }))
    }

    pub fn into_inner(self) -> Pin<Box<dyn Stream<Item = Result<MessageChunk, LlmError>> + Send>> {
        self.inner
    }
}

/// Provider-agnostic completion interface
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Generate a completion.
    ///
    /// Returns either a final answer or an assistant message with tool call
    /// requests. Failures are classified as transient, malformed output, or
    /// provider errors so callers can decide whether to retry.
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        config: Option<&LLMConfig>,
    ) -> Result<LLMResponse, LlmError>;

    /// Streaming completion. Falls back to `complete()` by default.
    async fn stream(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        config: Option<&LLMConfig>,
    ) -> Result<LLMResponseStream, LlmError> {
        let response = self.complete(messages, tools, config).await?;
        Ok(LLMResponseStream::from_complete(response))
    }

    fn name(&self) -> &str;

    fn default_model(&self) -> &str;
}
