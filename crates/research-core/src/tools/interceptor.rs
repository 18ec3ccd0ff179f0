//! Tool interceptor - pause before sensitive tools run
//!
//! # Interrupt flow
//!
//! 1. An agent calls a tool wrapped by [`InterceptedTool`]
//! 2. No decision is recorded for that call, so the wrapper raises
//!    [`ToolError::Interrupted`] without running the inner tool
//! 3. The node boundary suspends the run and checkpoints it
//! 4. The caller resumes with a decision; the runner records it in the
//!    run's [`ReviewLedger`] and re-executes the node
//! 5. The repeated call finds the decision: approved calls run, rejected
//!    calls return the rejection reason to the model
//!
//! Calls are matched by tool name and arguments, since a replayed model
//! call may assign a fresh tool call id.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

use super::{DynTool, Tool, ToolContext, ToolDefinition, ToolOutput, ToolSet};
use crate::error::ToolError;

/// Pending tool call awaiting review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInterrupt {
    pub tool_name: String,
    pub tool_call_id: String,
    pub args: serde_json::Value,
    pub description: String,
}

impl ToolInterrupt {
    pub fn new(tool_name: impl Into<String>, tool_call_id: impl Into<String>, args: serde_json::Value) -> Self {
        let tool_name = tool_name.into();
        let description = format!("Tool execution pending approval\n\nTool: {}\nArgs: {}", tool_name, args);
        Self {
            tool_name,
            tool_call_id: tool_call_id.into(),
            args,
            description,
        }
    }
}

/// Reviewer decision for an intercepted call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ToolDecision {
    Approve,
    Reject { reason: String },
}

#[derive(Debug, Clone)]
struct ReviewEntry {
    tool_name: String,
    args: serde_json::Value,
    decision: ToolDecision,
}

/// Decisions recorded for one run, consumed as matching calls occur
#[derive(Debug, Default)]
pub struct ReviewLedger {
    entries: Mutex<Vec<ReviewEntry>>,
}

impl ReviewLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a decision for the call described by `interrupt`
    pub fn record(&self, interrupt: &ToolInterrupt, decision: ToolDecision) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.push(ReviewEntry {
            tool_name: interrupt.tool_name.clone(),
            args: interrupt.args.clone(),
            decision,
        });
    }

    /// Take the decision for a matching call, if one was recorded
    pub fn take(&self, tool_name: &str, args: &serde_json::Value) -> Option<ToolDecision> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let index = entries
            .iter()
            .position(|e| e.tool_name == tool_name && &e.args == args)?;
        Some(entries.remove(index).decision)
    }

    pub fn is_empty(&self) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }
}

/// Decorator that requires a review decision before the inner tool runs
pub struct InterceptedTool {
    inner: DynTool,
}

impl InterceptedTool {
    pub fn new(inner: DynTool) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Tool for InterceptedTool {
    fn definition(&self) -> ToolDefinition {
        self.inner.definition()
    }

    async fn invoke(&self, args: serde_json::Value, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let name = self.inner.name();

        match ctx.reviews.take(&name, &args) {
            Some(ToolDecision::Approve) => {
                info!(run_id = %ctx.run_id, tool = %name, "Tool call approved, executing");
                self.inner.invoke(args, ctx).await
            }
            Some(ToolDecision::Reject { reason }) => {
                info!(run_id = %ctx.run_id, tool = %name, "Tool call rejected by reviewer");
                Ok(ToolOutput::text(format!(
                    "Tool '{}' was not executed: rejected by reviewer ({})",
                    name, reason
                )))
            }
            None => {
                info!(run_id = %ctx.run_id, tool = %name, "Interrupting before tool execution");
                Err(ToolError::Interrupted(ToolInterrupt::new(
                    name,
                    ctx.tool_call_id.clone(),
                    args,
                )))
            }
        }
    }
}

/// Wrap the named tools with [`InterceptedTool`]; others pass through unchanged
pub fn intercept_tools(tools: &ToolSet, interrupt_before: &[String]) -> ToolSet {
    tools
        .iter()
        .map(|tool| {
            let name = tool.name();
            if interrupt_before.iter().any(|n| n == &name) {
                debug!(tool = %name, "Wrapping tool with interceptor");
                Arc::new(InterceptedTool::new(Arc::clone(tool))) as DynTool
            } else {
                Arc::clone(tool)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTool {
        name: &'static str,
        calls: AtomicUsize,
    }

    impl CountingTool {
        fn new(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Tool for CountingTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: self.name.to_string(),
                description: "counts calls".to_string(),
                parameters: json!({"type": "object"}),
            }
        }

        async fn invoke(&self, _args: serde_json::Value, _ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ToolOutput::text("ran"))
        }
    }

    fn ctx(ledger: Arc<ReviewLedger>) -> ToolContext {
        ToolContext::new("run-1", ledger).for_call("call_1")
    }

    #[tokio::test]
    async fn test_unreviewed_call_interrupts_without_running() {
        let inner = CountingTool::new("python_repl");
        let tool = InterceptedTool::new(inner.clone());
        let ledger = Arc::new(ReviewLedger::new());

        let err = tool.invoke(json!({"code": "1+1"}), &ctx(ledger)).await.unwrap_err();

        match err {
            ToolError::Interrupted(interrupt) => {
                assert_eq!(interrupt.tool_name, "python_repl");
                assert_eq!(interrupt.tool_call_id, "call_1");
                assert_eq!(interrupt.args, json!({"code": "1+1"}));
            }
            other => panic!("expected interrupt, got {other:?}"),
        }
        assert_eq!(inner.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_approved_call_runs_once() {
        let inner = CountingTool::new("python_repl");
        let tool = InterceptedTool::new(inner.clone());
        let ledger = Arc::new(ReviewLedger::new());
        let args = json!({"code": "1+1"});
        ledger.record(&ToolInterrupt::new("python_repl", "old_id", args.clone()), ToolDecision::Approve);

        let out = tool.invoke(args.clone(), &ctx(ledger.clone())).await.unwrap();
        assert_eq!(out.content, "ran");
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
        assert!(ledger.is_empty());

        // Decision is consumed: the next identical call interrupts again
        assert!(tool.invoke(args, &ctx(ledger)).await.is_err());
    }

    #[tokio::test]
    async fn test_rejected_call_returns_reason() {
        let inner = CountingTool::new("python_repl");
        let tool = InterceptedTool::new(inner.clone());
        let ledger = Arc::new(ReviewLedger::new());
        let args = json!({"code": "rm -rf /"});
        ledger.record(
            &ToolInterrupt::new("python_repl", "call_1", args.clone()),
            ToolDecision::Reject { reason: "destructive".into() },
        );

        let out = tool.invoke(args, &ctx(ledger)).await.unwrap();
        assert!(out.content.contains("destructive"));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_intercept_tools_wraps_only_named_tools() {
        let search = CountingTool::new("web_search");
        let repl = CountingTool::new("python_repl");
        let set = ToolSet::new().with(search.clone()).with(repl.clone());

        let wrapped = intercept_tools(&set, &["python_repl".to_string()]);
        let ledger = Arc::new(ReviewLedger::new());

        assert_eq!(wrapped.names(), set.names());
        assert!(wrapped.get("web_search").unwrap().invoke(json!({}), &ctx(ledger.clone())).await.is_ok());
        assert!(wrapped.get("python_repl").unwrap().invoke(json!({}), &ctx(ledger)).await.is_err());
        assert_eq!(search.calls.load(Ordering::SeqCst), 1);
        assert_eq!(repl.calls.load(Ordering::SeqCst), 0);
    }
}
