//! Environment configuration for the research CLI
//!
//! Values come from the process environment, optionally seeded from a
//! `.env` file. Command-line flags override them in `main`.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    /// Ollama model backing every agent (e.g. "llama3.2")
    pub model: String,

    /// Separate model for the reasoning class (planner, reporter), if any
    pub reasoning_model: Option<String>,

    /// Ollama server URL
    pub ollama_host: String,

    /// Sampling temperature (0.0 - 2.0)
    pub temperature: f64,

    pub max_search_results: usize,

    pub max_step_num: usize,

    pub max_plan_iterations: u32,

    pub enable_clarification: bool,

    pub enable_background_investigation: bool,

    /// Tavily is used for search when a key is present, DuckDuckGo otherwise
    pub tavily_api_key: Option<String>,

    /// Durable checkpoints go here; in-memory when unset
    pub checkpoint_dir: Option<PathBuf>,

    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: "llama3.2".to_string(),
            reasoning_model: None,
            ollama_host: "http://localhost:11434".to_string(),
            temperature: 0.7,
            max_search_results: 3,
            max_step_num: 5,
            max_plan_iterations: 1,
            enable_clarification: false,
            enable_background_investigation: true,
            tavily_api_key: None,
            checkpoint_dir: None,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the environment
    pub fn from_env() -> Result<Self> {
        // A missing .env file is fine
        let _ = dotenvy::dotenv();

        let mut config = Config::default();

        if let Ok(val) = env::var("BASIC_MODEL").or_else(|_| env::var("OLLAMA_MODEL")) {
            config.model = val;
        }

        if let Ok(val) = env::var("REASONING_MODEL") {
            config.reasoning_model = Some(val).filter(|m| !m.trim().is_empty());
        }

        if let Ok(val) = env::var("OLLAMA_API_BASE_URL") {
            config.ollama_host = val;
        }

        if let Ok(val) = env::var("TEMPERATURE") {
            config.temperature = val
                .parse()
                .context("TEMPERATURE must be a valid floating-point number (e.g., 0.7)")?;
        }

        if let Ok(val) = env::var("MAX_SEARCH_RESULTS") {
            config.max_search_results = val
                .parse()
                .context("MAX_SEARCH_RESULTS must be a valid positive integer")?;
        }

        if let Ok(val) = env::var("MAX_STEP_NUM") {
            config.max_step_num = val.parse().context("MAX_STEP_NUM must be a positive integer")?;
        }

        if let Ok(val) = env::var("MAX_PLAN_ITERATIONS") {
            config.max_plan_iterations = val
                .parse()
                .context("MAX_PLAN_ITERATIONS must be a positive integer")?;
        }

        if let Ok(val) = env::var("ENABLE_CLARIFICATION") {
            config.enable_clarification = parse_flag(&val).context("ENABLE_CLARIFICATION must be true or false")?;
        }

        if let Ok(val) = env::var("ENABLE_BACKGROUND_INVESTIGATION") {
            config.enable_background_investigation =
                parse_flag(&val).context("ENABLE_BACKGROUND_INVESTIGATION must be true or false")?;
        }

        if let Ok(val) = env::var("TAVILY_API_KEY") {
            config.tavily_api_key = Some(val).filter(|k| !k.trim().is_empty());
        }

        if let Ok(val) = env::var("CHECKPOINT_DIR") {
            config.checkpoint_dir = Some(PathBuf::from(val));
        }

        if let Ok(val) = env::var("RUST_LOG") {
            config.log_level = val;
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.temperature) {
            anyhow::bail!(
                "Temperature must be between 0.0 and 2.0, got: {}",
                self.temperature
            );
        }

        if self.max_search_results == 0 {
            anyhow::bail!("MAX_SEARCH_RESULTS must be at least 1");
        }

        if self.max_step_num == 0 {
            anyhow::bail!("MAX_STEP_NUM must be at least 1");
        }

        if self.max_plan_iterations == 0 {
            anyhow::bail!("MAX_PLAN_ITERATIONS must be at least 1");
        }

        if self.model.trim().is_empty() {
            anyhow::bail!("BASIC_MODEL cannot be empty");
        }

        if !self.ollama_host.starts_with("http") {
            anyhow::bail!("OLLAMA_API_BASE_URL must be an http(s) URL, got: {}", self.ollama_host);
        }

        Ok(())
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
