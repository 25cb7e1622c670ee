//! Command-line argument parsing for assertagent
//!
//! Provides clap-based CLI with subcommands and verbosity control. Flags
//! given on the command line override the configuration file.

use crate::config::{Config, GenerationMode};
use crate::types::Language;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

/// assertagent - Multi-agent assertion generation for unit tests
#[derive(Parser, Debug)]
#[command(name = "assertagent")]
#[command(version)]
#[command(about = "Generate test assertions with a writer/reviewer agent loop", long_about = None)]
pub struct Args {
    /// Configuration file path (default: ~/.assertagent/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level: default (info), -v (debug), -vv (trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (warnings and errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate assertions for a range of dataset tasks
    Run(RunArgs),

    /// Display the effective configuration
    Config {
        /// Write the default configuration file
        #[arg(long)]
        init: bool,
    },
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    /// JSONL dataset, one task per line
    #[arg(long)]
    pub dataset: PathBuf,

    /// Language of the dataset: java or python
    #[arg(long)]
    pub lang: Language,

    /// First task index
    #[arg(long, default_value_t = 0)]
    pub start: usize,

    /// One past the last task index; ignored unless greater than --start
    #[arg(long, default_value_t = 0)]
    pub end: usize,

    /// Tasks run concurrently
    #[arg(long, default_value_t = 1)]
    pub workers: usize,

    /// Verify candidates by running the test and offer debugger tools
    #[arg(long)]
    pub with_dynamic: bool,

    /// Run the explorer before the first writer turn
    #[arg(long)]
    pub with_explore_agent: bool,

    /// Show local variables at the assertion point to the writer
    #[arg(long)]
    pub with_locals: bool,

    /// Candidates wanted per task
    #[arg(long)]
    pub nums: Option<usize>,

    /// Cycles attempted per task
    #[arg(long)]
    pub max_tries: Option<usize>,

    /// First debugger port; worker N uses port + N
    #[arg(long)]
    pub debug_port: Option<u16>,

    #[arg(long)]
    pub model: Option<String>,

    #[arg(long)]
    pub base_url: Option<String>,

    #[arg(long)]
    pub api_key: Option<String>,

    #[arg(long)]
    pub temperature: Option<f32>,

    #[arg(long)]
    pub top_p: Option<f32>,

    #[arg(long, allow_hyphen_values = true)]
    pub top_k: Option<i32>,

    #[arg(long)]
    pub max_tokens: Option<u32>,

    #[arg(long)]
    pub repetition_penalty: Option<f32>,

    /// Prompt suffix convention: default, think or no_think
    #[arg(long)]
    pub generation_mode: Option<GenerationMode>,

    /// Replay model replies from a JSONL file instead of calling a server
    #[arg(long)]
    pub replay: Option<PathBuf>,

    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    #[arg(long)]
    pub resource_dir: Option<PathBuf>,

    #[arg(long)]
    pub repo_cache_dir: Option<PathBuf>,
}

/// Verbosity level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    VeryVerbose,
}

impl Args {
    /// Get verbosity level based on flags
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::VeryVerbose,
            }
        }
    }
}

impl Verbosity {
    /// Default `tracing` filter directive for this level
    pub fn filter(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "warn",
            Verbosity::Normal => "info",
            Verbosity::Verbose => "debug",
            Verbosity::VeryVerbose => "trace",
        }
    }
}

impl RunArgs {
    /// Apply command-line overrides on top of the loaded configuration
    pub fn apply(&self, config: &mut Config) {
        let pipeline = &mut config.pipeline;
        pipeline.with_dynamic |= self.with_dynamic;
        pipeline.with_explore_agent |= self.with_explore_agent;
        pipeline.with_locals |= self.with_locals;
        if let Some(nums) = self.nums {
            pipeline.nums = nums;
        }
        if let Some(max_tries) = self.max_tries {
            pipeline.max_tries = max_tries;
        }
        if let Some(port) = self.debug_port {
            pipeline.debug_port = port;
        }

        let model = &mut config.model;
        if let Some(name) = &self.model {
            model.model = name.clone();
        }
        if let Some(base_url) = &self.base_url {
            model.base_url = base_url.clone();
        }
        if self.api_key.is_some() {
            model.api_key = self.api_key.clone();
        }
        if let Some(v) = self.temperature {
            model.temperature = v;
        }
        if let Some(v) = self.top_p {
            model.top_p = v;
        }
        if let Some(v) = self.top_k {
            model.top_k = v;
        }
        if let Some(v) = self.max_tokens {
            model.max_tokens = v;
        }
        if let Some(v) = self.repetition_penalty {
            model.repetition_penalty = v;
        }
        if let Some(mode) = self.generation_mode {
            model.generation_mode = mode;
        }

        let paths = &mut config.paths;
        if let Some(dir) = &self.output_dir {
            paths.output_dir = dir.clone();
        }
        if let Some(dir) = &self.resource_dir {
            paths.resource_dir = dir.clone();
        }
        if let Some(dir) = &self.repo_cache_dir {
            paths.repo_cache_dir = dir.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_flags_override_config() {
        let args = Args::parse_from([
            "assertagent",
            "-v",
            "run",
            "--dataset",
            "data.jsonl",
            "--lang",
            "python",
            "--with-dynamic",
            "--nums",
            "2",
            "--top-k",
            "-1",
            "--generation-mode",
            "no_think",
        ]);
        assert_eq!(args.verbosity(), Verbosity::Verbose);

        let Commands::Run(run) = args.command else {
            panic!("expected run");
        };
        assert_eq!(run.lang, Language::Python);

        let mut config = Config::default();
        run.apply(&mut config);
        assert!(config.pipeline.with_dynamic);
        assert!(!config.pipeline.with_locals);
        assert_eq!(config.pipeline.nums, 2);
        assert_eq!(config.pipeline.max_tries, 10);
        assert_eq!(config.model.top_k, -1);
        assert_eq!(config.model.generation_mode, GenerationMode::NoThink);
    }

    #[test]
    fn test_verbosity_levels() {
        let quiet = Args::parse_from(["assertagent", "--quiet", "config"]);
        assert_eq!(quiet.verbosity(), Verbosity::Quiet);
        assert_eq!(quiet.verbosity().filter(), "warn");

        let loud = Args::parse_from(["assertagent", "config", "-vv"]);
        assert_eq!(loud.verbosity(), Verbosity::VeryVerbose);
        assert!(matches!(loud.command, Commands::Config { init: false }));
    }
}
