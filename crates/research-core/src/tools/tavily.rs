//! Tavily search provider
//!
//! Web search through the Tavily Search API. Transient HTTP failures are
//! retried with exponential backoff before being reported; whatever is still
//! failing afterwards surfaces as [`ToolError::Transient`] so the node
//! boundary can apply its own retry budget.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::{Tool, ToolContext, ToolDefinition, ToolOutput};
use crate::error::ToolError;
use crate::state::Resource;

const DEFAULT_BASE_URL: &str = "https://api.tavily.com";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

const MAX_RETRIES: u32 = 2;

/// Base delay for exponential backoff (milliseconds)
const RETRY_BASE_DELAY_MS: u64 = 500;

/// Characters of page content kept per result snippet
const SNIPPET_CHARS: usize = 300;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SearchDepth {
    #[default]
    Basic,
    Advanced,
}

impl SearchDepth {
    fn as_str(&self) -> &'static str {
        match self {
            SearchDepth::Basic => "basic",
            SearchDepth::Advanced => "advanced",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    #[default]
    General,
    News,
}

impl Topic {
    fn as_str(&self) -> &'static str {
        match self {
            Topic::General => "general",
            Topic::News => "news",
        }
    }
}

/// Tavily web search tool
///
/// ```ignore
/// let tool = TavilySearchTool::new("tvly-...");
/// let out = tool.invoke(json!({"query": "Rust async", "max_results": 3}), &ctx).await?;
/// ```
pub struct TavilySearchTool {
    api_key: String,
    client: Client,
    base_url: String,
    timeout: Duration,
    max_retries: u32,
    retry_base_delay: Duration,
}

impl TavilySearchTool {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            client: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: MAX_RETRIES,
            retry_base_delay: Duration::from_millis(RETRY_BASE_DELAY_MS),
        }
    }

    /// Create from the TAVILY_API_KEY environment variable
    pub fn from_env() -> Result<Self, ToolError> {
        let api_key = std::env::var("TAVILY_API_KEY").map_err(|_| {
            ToolError::Execution("TAVILY_API_KEY environment variable not set".to_string())
        })?;
        Ok(Self::new(api_key))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    /// Point the tool at another endpoint (proxies, tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn execute_with_retry(&self, request: &TavilyRequest) -> Result<TavilyResponse, TavilyError> {
        let mut last_error = TavilyError::Unknown("No attempts made".to_string());

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.retry_base_delay.saturating_mul(2u32.saturating_pow(attempt - 1));
                debug!(attempt, delay_ms = delay.as_millis() as u64, "Retrying Tavily request");
                tokio::time::sleep(delay).await;
            }

            match self.execute_single_request(request).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    if !e.is_retryable() {
                        return Err(e);
                    }
                    warn!(attempt, error = %e, "Tavily request failed, will retry");
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    async fn execute_single_request(&self, request: &TavilyRequest) -> Result<TavilyResponse, TavilyError> {
        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TavilyError::Timeout
                } else if e.is_connect() {
                    TavilyError::Connection(e.to_string())
                } else {
                    TavilyError::Network(e.to_string())
                }
            })?;

        let status = response.status();

        if status.is_success() {
            return response
                .json::<TavilyResponse>()
                .await
                .map_err(|e| TavilyError::ParseError(e.to_string()));
        }

        let error_text = response.text().await.unwrap_or_default();

        match status.as_u16() {
            401 => Err(TavilyError::Unauthorized),
            429 => Err(TavilyError::RateLimited),
            400 => Err(TavilyError::BadRequest(error_text)),
            500..=599 => Err(TavilyError::ServerError(status.as_u16(), error_text)),
            _ => Err(TavilyError::HttpError(status.as_u16(), error_text)),
        }
    }
}

/// Typed errors for the Tavily API
#[derive(Debug, thiserror::Error)]
pub enum TavilyError {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unauthorized - check API key")]
    Unauthorized,

    #[error("Rate limited - too many requests")]
    RateLimited,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Server error ({0}): {1}")]
    ServerError(u16, String),

    #[error("HTTP error ({0}): {1}")]
    HttpError(u16, String),

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl TavilyError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TavilyError::Timeout
                | TavilyError::Connection(_)
                | TavilyError::RateLimited
                | TavilyError::ServerError(_, _)
        )
    }
}

impl From<TavilyError> for ToolError {
    fn from(e: TavilyError) -> Self {
        if e.is_retryable() {
            ToolError::Transient(format!("Tavily API error: {}", e))
        } else {
            ToolError::Execution(format!("Tavily API error: {}", e))
        }
    }
}

#[derive(Debug, Deserialize)]
struct TavilySearchArgs {
    query: String,

    #[serde(default = "default_max_results")]
    max_results: u32,

    #[serde(default)]
    search_depth: SearchDepth,

    #[serde(default)]
    topic: Topic,

    #[serde(default)]
    include_answer: bool,
}

fn default_max_results() -> u32 {
    5
}

#[derive(Debug, Serialize)]
struct TavilyRequest {
    query: String,
    max_results: u32,
    search_depth: String,
    topic: String,
    include_answer: bool,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    answer: Option<String>,
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    title: String,
    url: String,
    content: String,
    #[serde(default)]
    score: f64,
}

impl TavilyResult {
    fn to_markdown(&self) -> String {
        format!(
            "### [{}]({})\n**Relevance:** {:.0}%\n\n{}\n",
            self.title,
            self.url,
            self.score * 100.0,
            self.content
        )
    }

    fn to_resource(&self) -> Resource {
        let snippet: String = self.content.chars().take(SNIPPET_CHARS).collect();
        Resource::new(&self.title, &self.url).with_snippet(snippet)
    }
}

#[async_trait]
impl Tool for TavilySearchTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "tavily_search".to_string(),
            description: "Search the web using Tavily Search API. Returns relevant web pages with titles, URLs, and content snippets.".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search query to execute",
                        "maxLength": 400
                    },
                    "max_results": {
                        "type": "integer",
                        "description": "Maximum number of results to return (default: 5, max: 20)",
                        "default": 5,
                        "minimum": 1,
                        "maximum": 20
                    },
                    "search_depth": {
                        "type": "string",
                        "enum": ["basic", "advanced"],
                        "default": "basic"
                    },
                    "topic": {
                        "type": "string",
                        "enum": ["general", "news"],
                        "default": "general"
                    },
                    "include_answer": {
                        "type": "boolean",
                        "description": "Include an AI-generated answer summarizing the results",
                        "default": false
                    }
                },
                "required": ["query"],
                "additionalProperties": false
            }),
        }
    }

    async fn invoke(&self, args: serde_json::Value, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        debug!(run_id = %ctx.run_id, tool_call_id = %ctx.tool_call_id, "Executing tavily_search");

        let args: TavilySearchArgs = serde_json::from_value(args)?;

        if args.query.trim().is_empty() {
            return Err(ToolError::InvalidArguments("query must not be empty".to_string()));
        }
        if args.query.len() > 400 {
            return Err(ToolError::InvalidArguments(
                "Query too long (max 400 characters)".to_string(),
            ));
        }

        let request = TavilyRequest {
            query: args.query.clone(),
            max_results: args.max_results.clamp(1, 20),
            search_depth: args.search_depth.as_str().to_string(),
            topic: args.topic.as_str().to_string(),
            include_answer: args.include_answer,
        };

        let response = self.execute_with_retry(&request).await?;

        let mut output = format!("## Search Results for: \"{}\"\n\n", args.query);
        if let Some(answer) = &response.answer {
            output.push_str("### AI Summary\n");
            output.push_str(answer);
            output.push_str("\n\n---\n\n");
        }

        if response.results.is_empty() {
            output.push_str("No results found.\n");
        } else {
            output.push_str(&format!("Found {} results:\n\n", response.results.len()));
            for result in &response.results {
                output.push_str(&result.to_markdown());
                output.push('\n');
            }
        }

        let resources = response.results.iter().map(TavilyResult::to_resource).collect();
        Ok(ToolOutput::text(output).with_resources(resources))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ReviewLedger;
    use serde_json::json;
    use std::sync::Arc;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ctx() -> ToolContext {
        ToolContext::new("run-1", Arc::new(ReviewLedger::new())).for_call("call_1")
    }

    fn tool_for(server: &MockServer) -> TavilySearchTool {
        TavilySearchTool::new("test-key")
            .with_base_url(server.uri())
            .with_retry_base_delay(Duration::from_millis(1))
    }

    #[test]
    fn test_tool_definition() {
        let def = TavilySearchTool::new("test-key").definition();
        assert_eq!(def.name, "tavily_search");
        assert_eq!(def.parameters["required"], json!(["query"]));
        assert_eq!(def.parameters["properties"]["max_results"]["maximum"], 20);
    }

    #[test]
    fn test_args_defaults_and_enum_validation() {
        let args: TavilySearchArgs = serde_json::from_value(json!({"query": "test"})).unwrap();
        assert_eq!(args.max_results, 5);
        assert_eq!(args.search_depth, SearchDepth::Basic);
        assert_eq!(args.topic, Topic::General);

        let bad: Result<TavilySearchArgs, _> =
            serde_json::from_value(json!({"query": "test", "search_depth": "deep"}));
        assert!(bad.is_err());
    }

    #[test]
    fn test_error_classification() {
        assert!(TavilyError::Timeout.is_retryable());
        assert!(TavilyError::ServerError(502, String::new()).is_retryable());
        assert!(!TavilyError::Unauthorized.is_retryable());

        assert!(ToolError::from(TavilyError::RateLimited).is_transient());
        assert!(!ToolError::from(TavilyError::BadRequest("q".into())).is_transient());
    }

    #[tokio::test]
    async fn test_successful_search_returns_resources() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(header("Authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "answer": "Paris",
                "results": [
                    {"title": "Paris - Wikipedia", "url": "https://en.wikipedia.org/wiki/Paris", "content": "Paris is the capital of France.", "score": 0.98}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let out = tool_for(&server)
            .invoke(json!({"query": "capital of France", "include_answer": true}), &ctx())
            .await
            .unwrap();

        assert!(out.content.contains("### AI Summary"));
        assert!(out.content.contains("**Relevance:** 98%"));
        assert_eq!(out.resources.len(), 1);
        assert_eq!(out.resources[0].url, "https://en.wikipedia.org/wiki/Paris");
        assert_eq!(out.resources[0].snippet.as_deref(), Some("Paris is the capital of France."));
    }

    #[tokio::test]
    async fn test_server_errors_are_retried_then_reported_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .expect(3)
            .mount(&server)
            .await;

        let err = tool_for(&server)
            .with_max_retries(2)
            .invoke(json!({"query": "anything"}), &ctx())
            .await
            .unwrap_err();

        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_unauthorized_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let err = tool_for(&server)
            .invoke(json!({"query": "anything"}), &ctx())
            .await
            .unwrap_err();

        assert!(matches!(err, ToolError::Execution(_)));
    }

    #[tokio::test]
    async fn test_rejects_empty_query() {
        let err = TavilySearchTool::new("k")
            .invoke(json!({"query": "  "}), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
