//! Shared fixtures for workflow integration tests
//!
//! [`ScriptedProvider`] answers as whichever agent is asking, recognised by
//! the heading of the system prompt. Each role has a deterministic default
//! behavior that can be overridden with a queue of scripted replies.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use research_core::checkpoint::DynCheckpointer;
use research_core::error::{LlmError, ToolError};
use research_core::llm::{LLMConfig, LLMProvider, LLMResponse, ProviderRegistry};
use research_core::state::{Message, Resource, Role, ToolCall};
use research_core::tools::{Tool, ToolContext, ToolDefinition, ToolOutput};
use research_core::{RetryPolicy, RunConfig, WorkflowRunner};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Agent {
    Coordinator,
    Planner,
    Researcher,
    Coder,
    Reporter,
}

impl Agent {
    fn from_system_prompt(prompt: &str) -> Option<Self> {
        match prompt.lines().next()?.trim() {
            "# Research Coordinator" => Some(Agent::Coordinator),
            "# Research Planner" => Some(Agent::Planner),
            "# Researcher" => Some(Agent::Researcher),
            "# Coder" => Some(Agent::Coder),
            "# Reporter" => Some(Agent::Reporter),
            _ => None,
        }
    }
}

/// One scripted model answer
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Call { name: String, args: serde_json::Value },
    Transient,
    /// Provider-side structured output failure
    Malformed(String),
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Reply::Text(text.into())
    }

    pub fn call(name: impl Into<String>, args: serde_json::Value) -> Self {
        Reply::Call {
            name: name.into(),
            args,
        }
    }
}

#[derive(Default)]
pub struct ScriptedProvider {
    scripts: Mutex<HashMap<Agent, VecDeque<Reply>>>,
    calls: Mutex<Vec<Agent>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue replies for an agent; defaults resume once the queue is empty
    pub fn script(self, agent: Agent, replies: Vec<Reply>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(agent)
            .or_default()
            .extend(replies);
        self
    }

    pub fn calls(&self, agent: Agent) -> usize {
        self.calls.lock().unwrap().iter().filter(|a| **a == agent).count()
    }

    fn default_reply(agent: Agent, system: &str, messages: &[Message], tools: &[ToolDefinition]) -> Reply {
        let last = messages.last().map(|m| m.content.as_str()).unwrap_or_default();
        match agent {
            Agent::Coordinator => {
                let query = messages
                    .iter()
                    .find(|m| m.role == Role::User)
                    .map(|m| m.content.clone())
                    .unwrap_or_default();
                Reply::call("handoff_to_planner", json!({"research_topic": query}))
            }
            Agent::Planner => Reply::Text(plan_json(&after(system, "You plan the information gathering for: "), 2)),
            Agent::Researcher => {
                let last_is_tool = messages.last().is_some_and(|m| m.role == Role::Tool);
                if last_is_tool {
                    Reply::text(format!("Findings: {}", last))
                } else if tools.iter().any(|t| t.name == "web_search") {
                    Reply::call("web_search", json!({"query": step_title(last)}))
                } else {
                    Reply::text(format!("Findings without search for {}", step_title(last)))
                }
            }
            Agent::Coder => Reply::text(format!("Computed result for {}", step_title(last))),
            Agent::Reporter => Reply::text(format!(
                "# Report: {}\n\nBased on the collected observations.",
                after(system, "Write the final report about: ")
            )),
        }
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        _config: Option<&LLMConfig>,
    ) -> Result<LLMResponse, LlmError> {
        let system = messages
            .first()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        let agent = Agent::from_system_prompt(system)
            .ok_or_else(|| LlmError::Provider("unrecognised system prompt".to_string()))?;
        self.calls.lock().unwrap().push(agent);

        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&agent)
            .and_then(VecDeque::pop_front);
        let conversation = &messages[1..];
        let reply = scripted.unwrap_or_else(|| Self::default_reply(agent, system, conversation, tools));

        match reply {
            Reply::Text(text) => Ok(LLMResponse::new(Message::assistant(&text))),
            Reply::Call { name, args } => Ok(LLMResponse::new(Message::assistant_with_tool_calls(
                "",
                vec![ToolCall {
                    id: format!("call_{}", name),
                    name,
                    arguments: args,
                }],
            ))),
            Reply::Transient => Err(LlmError::Transient("simulated 503".to_string())),
            Reply::Malformed(raw) => Err(LlmError::MalformedOutput(raw)),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn default_model(&self) -> &str {
        "scripted-model"
    }
}

/// Rest of the line following `marker` in `text`
fn after(text: &str, marker: &str) -> String {
    text.lines()
        .find_map(|line| line.strip_prefix(marker))
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// Title of the current task in a step request
fn step_title(request: &str) -> String {
    request
        .split("# Current Task")
        .nth(1)
        .and_then(|rest| rest.lines().find_map(|l| l.strip_prefix("## ")))
        .unwrap_or("unknown step")
        .trim()
        .to_string()
}

/// Plan with `research_steps` research steps and one processing step
pub fn plan_json(topic: &str, research_steps: usize) -> String {
    let mut steps: Vec<serde_json::Value> = (1..=research_steps)
        .map(|i| {
            json!({
                "title": format!("Research {} part {}", topic, i),
                "description": format!("Collect facts about {}", topic),
                "step_type": "research",
                "need_search": true
            })
        })
        .collect();
    steps.push(json!({
        "title": format!("Analyze {}", topic),
        "description": "Summarize the numbers",
        "step_type": "processing",
        "need_search": false
    }));

    let plan = json!({
        "locale": "en-US",
        "has_enough_context": false,
        "thought": format!("Investigate {}", topic),
        "title": format!("Plan for {}", topic),
        "steps": steps
    });
    format!("```json\n{}\n```", plan)
}

/// Search tool returning one resource per query
pub struct MockSearch {
    calls: AtomicUsize,
    failures: AtomicUsize,
}

impl MockSearch {
    pub fn new() -> Arc<Self> {
        Self::failing(0)
    }

    /// Fails transiently for the first `failures` calls
    pub fn failing(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            failures: AtomicUsize::new(failures),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for MockSearch {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "web_search".to_string(),
            description: "Search the web".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {"query": {"type": "string"}},
                "required": ["query"]
            }),
        }
    }

    async fn invoke(&self, args: serde_json::Value, _ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(ToolError::Transient("search backend timed out".to_string()));
        }

        let query = args["query"].as_str().unwrap_or_default().to_string();
        let slug: String = query
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
            .collect();
        Ok(ToolOutput::text(format!("Result for {}", query))
            .with_resources(vec![Resource::new(query.clone(), format!("https://example.com/{}", slug))]))
    }
}

/// Config with fast retries and no background investigation
pub fn test_config() -> RunConfig {
    RunConfig::default()
        .with_background_investigation(false)
        .with_retry_policy(RetryPolicy::new(1).with_backoff_base(Duration::from_millis(1)))
}

pub fn runner(provider: Arc<ScriptedProvider>, search: Arc<MockSearch>) -> WorkflowRunner {
    WorkflowRunner::builder()
        .providers(ProviderRegistry::single(provider))
        .search_tool(search)
        .build()
        .unwrap()
}

pub fn runner_with_store(
    provider: Arc<ScriptedProvider>,
    search: Arc<MockSearch>,
    checkpointer: DynCheckpointer,
) -> WorkflowRunner {
    WorkflowRunner::builder()
        .providers(ProviderRegistry::single(provider))
        .search_tool(search)
        .checkpointer(checkpointer)
        .build()
        .unwrap()
}
