//! System prompt templates
//!
//! Prompts are rendered from an immutable [`PromptContext`] built when the
//! agent is constructed. Rendering never looks at mutable workflow state, so
//! a resumed run renders the same prompt the suspended run did.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ReportStyle;

/// Template identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptTemplate {
    Coordinator,
    Planner,
    Researcher,
    Coder,
    Reporter,
}

/// Values a template is rendered with
#[derive(Debug, Clone, PartialEq)]
pub struct PromptContext {
    pub locale: String,
    pub research_topic: String,
    pub max_step_num: usize,
    pub report_style: ReportStyle,
    pub current_date: DateTime<Utc>,
}

impl PromptContext {
    pub fn new(locale: impl Into<String>, research_topic: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            research_topic: research_topic.into(),
            max_step_num: 5,
            report_style: ReportStyle::default(),
            current_date: Utc::now(),
        }
    }

    pub fn with_max_step_num(mut self, max_step_num: usize) -> Self {
        self.max_step_num = max_step_num;
        self
    }

    pub fn with_report_style(mut self, report_style: ReportStyle) -> Self {
        self.report_style = report_style;
        self
    }

    pub fn with_current_date(mut self, current_date: DateTime<Utc>) -> Self {
        self.current_date = current_date;
        self
    }

    fn date(&self) -> String {
        self.current_date.format("%Y-%m-%d").to_string()
    }
}

impl PromptTemplate {
    pub fn render(&self, ctx: &PromptContext) -> String {
        match self {
            PromptTemplate::Coordinator => coordinator(ctx),
            PromptTemplate::Planner => planner(ctx),
            PromptTemplate::Researcher => researcher(ctx),
            PromptTemplate::Coder => coder(ctx),
            PromptTemplate::Reporter => reporter(ctx),
        }
    }
}

fn coordinator(ctx: &PromptContext) -> String {
    format!(
        r#"# Research Coordinator

For context, today's date is {date}.

You receive research requests from the user. Greet briefly when the user only says hello, and decline requests that are harmful or not research.

For research requests:
- If the request is clear, call `handoff_to_planner` with a concise `research_topic`.
- If the request is ambiguous and the `ask_clarification` tool is available, ask ONE focused question.

Always respond in the user's language ({locale})."#,
        date = ctx.date(),
        locale = ctx.locale,
    )
}

fn planner(ctx: &PromptContext) -> String {
    format!(
        r#"# Research Planner

For context, today's date is {date}.

You plan the information gathering for: {topic}

Decide whether the context gathered so far is enough to answer the question. If it is, set `has_enough_context` to true and return no steps. Otherwise break the work into at most {max_steps} steps.

- `research` steps gather information from the web (`need_search: true`).
- `processing` steps compute or analyze data with code (`need_search: false`).

Respond with a single JSON object and nothing else:

```json
{{
  "locale": "{locale}",
  "has_enough_context": false,
  "thought": "why these steps",
  "title": "plan title",
  "steps": [
    {{"title": "...", "description": "...", "step_type": "research", "need_search": true}}
  ]
}}
```"#,
        date = ctx.date(),
        topic = ctx.research_topic,
        max_steps = ctx.max_step_num,
        locale = ctx.locale,
    )
}

fn researcher(ctx: &PromptContext) -> String {
    format!(
        r#"# Researcher

For context, today's date is {date}.

You execute one research step of a larger plan about: {topic}

1. Use the search tools to find authoritative, recent sources.
2. Stop searching once you can answer the step; avoid redundant queries.
3. Answer with the findings in markdown, citing URLs inline.

Write in {locale}."#,
        date = ctx.date(),
        topic = ctx.research_topic,
        locale = ctx.locale,
    )
}

fn coder(ctx: &PromptContext) -> String {
    format!(
        r#"# Coder

For context, today's date is {date}.

You execute one processing step of a larger plan about: {topic}

Analyze the data from previous steps, run code with the available tools when computation is needed, and report the results with a short explanation of the method.

Write in {locale}."#,
        date = ctx.date(),
        topic = ctx.research_topic,
        locale = ctx.locale,
    )
}

fn reporter(ctx: &PromptContext) -> String {
    let style = match ctx.report_style {
        ReportStyle::Academic => "formal academic prose with precise terminology",
        ReportStyle::PopularScience => "engaging explanations for a general audience",
        ReportStyle::News => "concise news reporting, most important facts first",
        ReportStyle::SocialMedia => "short, punchy posts suitable for social media",
        ReportStyle::Investment => "investment analysis highlighting risks and opportunities",
    };

    format!(
        r#"# Reporter

For context, today's date is {date}.

Write the final report about: {topic}

Style: {style}.

Structure:
1. Title
2. Key points
3. Detailed analysis
4. Conclusion
5. ### Sources (one numbered entry per unique URL)

Only use information from the provided observations. Say clearly when information is missing. Write in {locale}."#,
        date = ctx.date(),
        topic = ctx.research_topic,
        style = style,
        locale = ctx.locale,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ctx() -> PromptContext {
        PromptContext::new("fr-FR", "Capital of France")
            .with_max_step_num(3)
            .with_current_date(Utc.with_ymd_and_hms(2025, 1, 15, 0, 0, 0).unwrap())
    }

    #[test]
    fn test_planner_prompt_carries_context() {
        let prompt = PromptTemplate::Planner.render(&ctx());
        assert!(prompt.contains("2025-01-15"));
        assert!(prompt.contains("at most 3 steps"));
        assert!(prompt.contains("\"locale\": \"fr-FR\""));
        assert!(prompt.contains("Capital of France"));
    }

    #[test]
    fn test_render_is_stable_for_same_context() {
        let ctx = ctx();
        for template in [
            PromptTemplate::Coordinator,
            PromptTemplate::Researcher,
            PromptTemplate::Coder,
            PromptTemplate::Reporter,
        ] {
            assert_eq!(template.render(&ctx), template.render(&ctx.clone()));
            assert!(template.render(&ctx).contains("fr-FR"));
        }
    }

    #[test]
    fn test_reporter_style() {
        let prompt = PromptTemplate::Reporter.render(&ctx().with_report_style(ReportStyle::News));
        assert!(prompt.contains("news reporting"));
    }
}
