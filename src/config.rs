use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

/// Prompt suffix convention for hybrid reasoning models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    #[default]
    Default,
    Think,
    NoThink,
}

impl GenerationMode {
    /// Append the mode marker to a user prompt
    pub fn apply(&self, prompt: &str) -> String {
        match self {
            GenerationMode::Default => prompt.to_string(),
            GenerationMode::Think => format!("{} /think", prompt),
            GenerationMode::NoThink => format!("{} /no_think", prompt),
        }
    }
}

impl std::str::FromStr for GenerationMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "" | "default" => Ok(GenerationMode::Default),
            "think" => Ok(GenerationMode::Think),
            "no_think" => Ok(GenerationMode::NoThink),
            other => Err(format!("unknown generation mode: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    /// -1 disables top-k sampling on vLLM-style servers
    pub top_k: i32,
    pub max_tokens: u32,
    pub repetition_penalty: f32,
    pub generation_mode: GenerationMode,
    pub request_timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000/v1".to_string(),
            api_key: None,
            model: "Qwen3-Coder-30B-A3B-Instruct".to_string(),
            temperature: 1.0,
            top_p: 1.0,
            top_k: -1,
            max_tokens: 1024,
            repetition_penalty: 1.0,
            generation_mode: GenerationMode::Default,
            request_timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub with_dynamic: bool,
    pub with_explore_agent: bool,
    pub with_locals: bool,
    pub max_tool_calls: usize,
    pub max_reviews: usize,
    pub nums: usize,
    pub max_tries: usize,
    pub debug_port: u16,
    pub max_callees: usize,
    pub max_style_functions: usize,
    pub maven_timeout_secs: u64,
    pub pytest_timeout_secs: u64,
    pub debugger_port_wait_secs: u64,
    pub debugger_prompt_timeout_secs: u64,
    /// Launches tried before dynamic tools are given up for a task
    pub debugger_start_attempts: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            with_dynamic: false,
            with_explore_agent: false,
            with_locals: false,
            max_tool_calls: 5,
            max_reviews: 3,
            nums: 10,
            max_tries: 10,
            debug_port: 6001,
            max_callees: 10,
            max_style_functions: 10,
            maven_timeout_secs: 120,
            pytest_timeout_secs: 10,
            debugger_port_wait_secs: 60,
            debugger_prompt_timeout_secs: 60,
            debugger_start_attempts: 3,
        }
    }
}

impl PipelineConfig {
    pub fn maven_timeout(&self) -> Duration {
        Duration::from_secs(self.maven_timeout_secs)
    }

    pub fn pytest_timeout(&self) -> Duration {
        Duration::from_secs(self.pytest_timeout_secs)
    }

    /// Whether a debugger session is needed at all for a task
    pub fn needs_debugger(&self) -> bool {
        self.with_dynamic || self.with_locals
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Checkouts of the benchmark repositories, one directory per repo name
    pub repo_cache_dir: PathBuf,
    /// Scratch copies used by debugger sessions
    pub debug_cache_dir: PathBuf,
    /// Precomputed call-graph JSON artifacts
    pub calls_extract_dir: PathBuf,
    /// Explorer summaries
    pub agent_cache_dir: PathBuf,
    pub output_dir: PathBuf,
    pub resource_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            repo_cache_dir: PathBuf::from("/tmp/assertagent/repos"),
            debug_cache_dir: PathBuf::from("/tmp/assertagent/debug"),
            calls_extract_dir: PathBuf::from("cache/calls"),
            agent_cache_dir: PathBuf::from("cache/agents"),
            output_dir: PathBuf::from("results"),
            resource_dir: PathBuf::from("resources"),
        }
    }
}

impl Config {
    /// Load configuration from the default location, creating it if missing
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit file, creating it if missing
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            let config = Config::default();
            config.save_to(config_path)?;
            return Ok(config);
        }

        let contents = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file {}", config_path.display()))?;

        let config: Config = toml::from_str(&contents)
            .context("Failed to parse config file")?;

        Ok(config)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;
        self.save_to(&config_path)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .context("Failed to create config directory")?;
        }

        let toml_string = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        fs::write(config_path, toml_string)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .context("Could not determine home directory")?;

        Ok(home.join(".assertagent").join("config.toml"))
    }
}
