//! DuckDuckGo web search
//!
//! Keyless fallback search used when no Tavily key is configured. Results
//! are scraped from the DuckDuckGo HTML endpoint, so only titles (domains)
//! and URLs are reliable.

use async_trait::async_trait;
use research_core::{Resource, Tool, ToolContext, ToolDefinition, ToolError, ToolOutput};
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

const SEARCH_URL: &str = "https://html.duckduckgo.com/html/";
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Search request failed: HTTP {0}")]
    Http(reqwest::StatusCode),

    #[error("Rate limited by search provider, please wait")]
    RateLimited,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl From<SearchError> for ToolError {
    fn from(e: SearchError) -> Self {
        match e {
            SearchError::RateLimited | SearchError::Network(_) => ToolError::Transient(e.to_string()),
            SearchError::Http(status) if status.is_server_error() => ToolError::Transient(e.to_string()),
            SearchError::Http(_) => ToolError::Execution(e.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default)]
    max_results: Option<usize>,
}

/// One scraped hit
#[derive(Debug, Clone, PartialEq)]
struct Hit {
    title: String,
    url: String,
}

pub struct WebSearchTool {
    client: reqwest::Client,
    max_results: usize,
}

impl WebSearchTool {
    pub fn new(max_results: usize) -> Result<Self, SearchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client, max_results })
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Hit>, SearchError> {
        let url = format!("{}?q={}", SEARCH_URL, urlencoding::encode(query));
        debug!(url = %url, "Fetching search results");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(SearchError::RateLimited);
        }
        if !status.is_success() {
            return Err(SearchError::Http(status));
        }

        let body = response.text().await?;
        Ok(parse_results(&body, limit))
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "web_search".to_string(),
            description: "Search the web using DuckDuckGo. Use this to find current information about any topic."
                .to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search query to find information about"
                    },
                    "max_results": {
                        "type": "integer",
                        "description": "Maximum number of results to return",
                        "minimum": 1
                    }
                },
                "required": ["query"]
            }),
        }
    }

    async fn invoke(&self, args: serde_json::Value, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let args: SearchArgs =
            serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        if args.query.trim().is_empty() {
            return Err(ToolError::InvalidArguments("query must not be empty".to_string()));
        }

        let limit = args.max_results.unwrap_or(self.max_results).max(1);
        info!(run_id = %ctx.run_id, query = %args.query, limit, "Performing web search");

        let hits = self.search(&args.query, limit).await?;
        if hits.is_empty() {
            warn!(query = %args.query, "No search results found");
            return Ok(ToolOutput::text(format!("No results found for: {}", args.query)));
        }
        info!(query = %args.query, count = hits.len(), "Search completed");

        Ok(ToolOutput::text(format_hits(&args.query, &hits))
            .with_resources(hits.into_iter().map(|h| Resource::new(h.title, h.url)).collect()))
    }
}

fn format_hits(query: &str, hits: &[Hit]) -> String {
    let listed: Vec<String> = hits
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{}. **{}**\n   URL: {}", i + 1, h.title, h.url))
        .collect();
    format!("## Search Results for: {}\n\n{}", query, listed.join("\n"))
}

/// Extract result URLs from a DuckDuckGo HTML page.
///
/// Redirect links (`uddg=`) are preferred; the visible `result__url`
/// anchors fill any remaining slots.
fn parse_results(html: &str, limit: usize) -> Vec<Hit> {
    let mut seen = HashSet::new();
    let mut hits = Vec::new();

    let redirects = html.split("uddg=").skip(1).filter_map(|segment| {
        let end = segment.find(['&', '"', '\''])?;
        urlencoding::decode(&segment[..end]).ok().map(|u| u.into_owned())
    });
    let anchors = html.split("result__url").skip(1).filter_map(|segment| {
        let after = &segment[segment.find("href=\"")? + 6..];
        let href = &after[..after.find('"')?];
        match href {
            h if h.starts_with("//") => Some(format!("https:{}", h)),
            h if h.starts_with("http") => Some(h.to_string()),
            _ => None,
        }
    });

    for url in redirects.chain(anchors) {
        if hits.len() >= limit {
            break;
        }
        if !url.starts_with("http") || url.contains("duckduckgo.com") || !seen.insert(url.clone()) {
            continue;
        }
        hits.push(Hit {
            title: domain(&url).unwrap_or_else(|| "Result".to_string()),
            url,
        });
    }
    hits
}

fn domain(url: &str) -> Option<String> {
    url.split("//").nth(1)?.split('/').next().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.rust-lang.org%2Flearn&rut=1">Rust</a>
        <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.rust-lang.org%2Flearn&rut=2">Rust again</a>
        <a class="result__url" href="https://doc.rust-lang.org/book/">doc.rust-lang.org</a>
        <a class="result__url" href="https://duckduckgo.com/about">about</a>
    "#;

    #[test]
    fn test_parse_results_dedups_and_skips_internal_links() {
        let hits = parse_results(PAGE, 5);
        let urls: Vec<&str> = hits.iter().map(|h| h.url.as_str()).collect();
        assert_eq!(urls, vec!["https://www.rust-lang.org/learn", "https://doc.rust-lang.org/book/"]);
        assert_eq!(hits[0].title, "www.rust-lang.org");
    }

    #[test]
    fn test_parse_results_respects_limit() {
        assert_eq!(parse_results(PAGE, 1).len(), 1);
        assert!(parse_results("<html>nothing here</html>", 5).is_empty());
    }

    #[test]
    fn test_domain() {
        assert_eq!(domain("https://rust-lang.org/learn"), Some("rust-lang.org".to_string()));
        assert_eq!(domain("not a url"), None);
    }

    #[test]
    fn test_rate_limit_is_transient() {
        assert!(ToolError::from(SearchError::RateLimited).is_transient());
        assert!(!ToolError::from(SearchError::Http(reqwest::StatusCode::FORBIDDEN)).is_transient());
    }

    #[tokio::test]
    async fn test_empty_query_is_rejected() {
        let tool = WebSearchTool::new(3).unwrap();
        let ctx = ToolContext::new("run-1", Default::default());
        let err = tool.invoke(serde_json::json!({"query": "  "}), &ctx).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
