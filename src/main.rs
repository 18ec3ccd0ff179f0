//! # Deep Research
//!
//! Command-line front end for the multi-agent research workflow. A
//! coordinator scopes the question, a planner drafts research steps,
//! researcher and coder agents execute them, and a reporter writes the
//! final report. Runs that need input (plan review, clarification, tool
//! approval) prompt on stdin and resume from their checkpoint.
//!
//! ## Quick Start
//! ```bash
//! ollama pull llama3.2
//! cargo run -- "What are the latest developments in Rust async?"
//! ```

mod config;
mod providers;
mod tools;

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use research_core::{
    create_checkpointer, Checkpoint, CheckpointerConfig, DynTool, Feedback, Interrupt, LLMConfig, ReportStyle, ResearchProgress,
    RunConfig, RunEvent, RunOutcome, RunStream, TavilySearchTool, WorkflowRunner, WorkflowState,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::tools::WebSearchTool;

#[derive(Parser, Debug)]
#[command(
    name = "deep-research",
    version,
    about = "Multi-agent deep research with plan review and checkpointed runs",
    long_about = r#"
Deep Research - a team of agents that plans, researches and reports.

The workflow:
  1. A coordinator decides whether the request needs research
  2. An optional background search gathers first context
  3. A planner drafts research and processing steps
  4. Researcher and coder agents execute the steps in order
  5. A reporter writes the final report from the observations

PREREQUISITES:
  1. Install Ollama: https://ollama.ai
  2. Pull a model: ollama pull llama3.2
  3. Optional: set TAVILY_API_KEY for Tavily search (DuckDuckGo otherwise)

EXAMPLES:
  deep-research "What are the latest developments in Rust async?"
  deep-research --review-plan --max-steps 2 "Rust web frameworks 2025"
  deep-research --stream --report-style news "Ollama release highlights"
"#
)]
struct Args {
    /// The research topic or question to investigate
    #[arg(value_name = "QUERY")]
    query: String,

    /// Ollama model for every agent (overrides BASIC_MODEL)
    #[arg(short = 'm', long = "model")]
    model: Option<String>,

    /// Separate model for planning and reporting (overrides REASONING_MODEL)
    #[arg(long = "reasoning-model")]
    reasoning_model: Option<String>,

    #[arg(long, default_value = "en-US")]
    locale: String,

    /// academic, popular_science, news, social_media or investment
    #[arg(long = "report-style", default_value = "academic")]
    report_style: ReportStyle,

    /// Maximum number of steps in a plan (overrides MAX_STEP_NUM)
    #[arg(long = "max-steps")]
    max_steps: Option<usize>,

    /// Planner invocations allowed per run (overrides MAX_PLAN_ITERATIONS)
    #[arg(long = "max-plan-iterations")]
    max_plan_iterations: Option<u32>,

    /// Skip the background search before planning
    #[arg(long = "no-background")]
    no_background: bool,

    /// Let the coordinator ask clarification questions
    #[arg(long)]
    clarify: bool,

    /// Review the plan before research starts
    #[arg(long = "review-plan")]
    review_plan: bool,

    /// Ask for approval before these tools run (repeatable)
    #[arg(long = "interrupt-before", value_name = "TOOL")]
    interrupt_before: Vec<String>,

    /// Print progress after every step
    #[arg(short = 's', long)]
    stream: bool,

    /// Directory for durable checkpoints (overrides CHECKPOINT_DIR)
    #[arg(long = "checkpoint-dir")]
    checkpoint_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short = 'v', long)]
    verbose: bool,
}

impl Args {
    /// Run configuration from the environment with flags layered on top
    fn run_config(&self, config: &Config) -> RunConfig {
        RunConfig::default()
            .with_locale(self.locale.clone())
            .with_report_style(self.report_style)
            .with_max_step_num(self.max_steps.unwrap_or(config.max_step_num))
            .with_max_plan_iterations(self.max_plan_iterations.unwrap_or(config.max_plan_iterations))
            .with_background_investigation(config.enable_background_investigation && !self.no_background)
            .with_clarification(config.enable_clarification || self.clarify)
            .with_auto_accept_plan(!self.review_plan)
            .with_interrupt_before_tools(self.interrupt_before.clone())
            .with_max_search_results(config.max_search_results)
    }
}

/// Where a drive of the runner stopped
enum Stop {
    Done(WorkflowState),
    Waiting { run_id: String, interrupt: Interrupt },
}

impl From<RunOutcome> for Stop {
    fn from(outcome: RunOutcome) -> Self {
        match outcome {
            RunOutcome::Completed { state, .. } => Stop::Done(state),
            RunOutcome::Suspended { run_id, interrupt, .. } => Stop::Waiting { run_id, interrupt },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::from_env()?;
    init_logging(&config.log_level, args.verbose)?;

    if let Some(model) = &args.model {
        config.model = model.clone();
    }
    if let Some(model) = &args.reasoning_model {
        config.reasoning_model = Some(model.clone());
    }
    if let Some(dir) = &args.checkpoint_dir {
        config.checkpoint_dir = Some(dir.clone());
    }
    config.validate()?;

    info!(
        model = %config.model,
        host = %config.ollama_host,
        search = if config.tavily_api_key.is_some() { "tavily" } else { "duckduckgo" },
        "Configuration loaded"
    );

    let runner = build_runner(&config)?;
    let run_config = args.run_config(&config);

    if let Err(e) = research(&runner, &args, run_config).await {
        error!(error = %e, "Research failed");
        eprintln!("\nResearch failed: {:#}", e);
        if format!("{:#}", e).contains("onnection refused") {
            eprintln!("\nMake sure Ollama is running:\n   ollama serve");
        }
        return Err(e);
    }
    Ok(())
}

fn build_runner(config: &Config) -> Result<WorkflowRunner> {
    let search: DynTool = match &config.tavily_api_key {
        Some(key) => Arc::new(TavilySearchTool::new(key)),
        None => Arc::new(WebSearchTool::new(config.max_search_results).context("Failed to build search client")?),
    };

    let checkpointer = create_checkpointer(match &config.checkpoint_dir {
        Some(path) => CheckpointerConfig::File {
            path: path.clone(),
            compression: true,
        },
        None => CheckpointerConfig::Memory,
    });

    let runner = WorkflowRunner::builder()
        .providers(providers::ollama_registry(config))
        .llm_config(LLMConfig::new(&config.model).with_temperature(config.temperature))
        .search_tool(search)
        .checkpointer(checkpointer)
        .build()?;
    Ok(runner)
}

async fn research(runner: &WorkflowRunner, args: &Args, run_config: RunConfig) -> Result<()> {
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    let mut stop = if args.stream {
        follow(runner, runner.stream(&args.query, run_config).await?).await?
    } else {
        Stop::from(runner.run(&args.query, run_config).await?)
    };

    loop {
        match stop {
            Stop::Done(state) => {
                print_report(&state);
                info!("Research completed successfully");
                return Ok(());
            }
            Stop::Waiting { run_id, interrupt } => {
                let feedback = ask(&mut stdin, &interrupt).await?;
                info!(run_id = %run_id, feedback = feedback.kind(), "Resuming with feedback");
                stop = if args.stream {
                    follow(runner, runner.resume_stream(&run_id, feedback).await?).await?
                } else {
                    Stop::from(runner.resume(&run_id, feedback).await?)
                };
            }
        }
    }
}

/// Print progress events until the streamed drive ends
async fn follow(runner: &WorkflowRunner, mut stream: RunStream) -> Result<Stop> {
    let run_id = stream.run_id().to_string();

    while let Some(event) = stream.next().await {
        let event = event?;
        let progress = ResearchProgress::from_event(&event);
        match event {
            RunEvent::Finished(state) => return Ok(Stop::Done(*state)),
            RunEvent::Suspended { interrupt, .. } => return Ok(Stop::Waiting { run_id, interrupt }),
            RunEvent::Step { .. } => {
                println!("[{}] {}", progress.stage, progress.message);
                for observation in &progress.observations {
                    println!("    {}", first_line(observation));
                }
            }
        }
    }

    // The driver ended without a terminal event; the checkpoint says why
    let checkpoint = runner
        .checkpoint(&run_id)
        .await?
        .with_context(|| format!("run {} ended without a checkpoint", run_id))?;
    stop_at(checkpoint)
}

/// Where a run whose driver went away actually stands
fn stop_at(checkpoint: Checkpoint) -> Result<Stop> {
    match checkpoint.interrupt {
        Some(interrupt) => Ok(Stop::Waiting {
            run_id: checkpoint.run_id,
            interrupt,
        }),
        None if checkpoint.state.is_terminal() => Ok(Stop::Done(checkpoint.state)),
        None => anyhow::bail!(
            "run {} stopped before {} without a report; `recover` it from checkpoint {}",
            checkpoint.run_id,
            checkpoint.next_node,
            checkpoint.sequence
        ),
    }
}

async fn ask(stdin: &mut Lines<BufReader<Stdin>>, interrupt: &Interrupt) -> Result<Feedback> {
    println!("\n{}", "=".repeat(60));
    println!("{}", interrupt.prompt());
    println!("{}", hint(interrupt));

    loop {
        let line = stdin
            .next_line()
            .await?
            .context("stdin closed while waiting for feedback")?;
        match parse_feedback(interrupt, &line) {
            Some(feedback) => return Ok(feedback),
            None => println!("{}", hint(interrupt)),
        }
    }
}

fn hint(interrupt: &Interrupt) -> &'static str {
    match interrupt {
        Interrupt::PlanReview { .. } => "> [enter] accept | edit <instructions> | reject <reason>",
        Interrupt::Clarification { .. } => "> your answer:",
        Interrupt::ToolApproval(_) => "> [enter] approve | anything else rejects with that reason",
    }
}

/// Map a line typed by the user to feedback for `interrupt`
fn parse_feedback(interrupt: &Interrupt, line: &str) -> Option<Feedback> {
    let line = line.trim();
    let approved = line.is_empty() || matches!(line.to_ascii_lowercase().as_str(), "y" | "yes" | "approve" | "accept");

    match interrupt {
        Interrupt::PlanReview { .. } => {
            if approved {
                return Some(Feedback::Approve);
            }
            let (verb, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
            let rest = rest.trim().to_string();
            match verb.to_ascii_lowercase().as_str() {
                "edit" if !rest.is_empty() => Some(Feedback::Edit(rest)),
                "reject" => Some(Feedback::Reject(rest)),
                "edit" => None,
                _ => Some(Feedback::Edit(line.to_string())),
            }
        }
        Interrupt::Clarification { .. } if line.is_empty() => None,
        Interrupt::Clarification { .. } => Some(Feedback::Answer(line.to_string())),
        Interrupt::ToolApproval(_) if approved => Some(Feedback::Approve),
        Interrupt::ToolApproval(_) => Some(Feedback::Reject(line.to_string())),
    }
}

fn print_report(state: &WorkflowState) {
    println!("\n{}", "=".repeat(60));
    println!("RESEARCH REPORT");
    println!("{}\n", "=".repeat(60));
    println!("{}", state.final_report.as_deref().unwrap_or("(no report produced)"));

    if !state.resources.is_empty() {
        println!("\nSources:");
        for resource in &state.resources {
            println!("  - {} <{}>", resource.title, resource.url);
        }
    }
    println!("\n{}", "=".repeat(60));
}

fn first_line(text: &str) -> &str {
    text.lines().find(|l| !l.trim().is_empty()).unwrap_or_default()
}

fn init_logging(level: &str, verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))
}
