//! assertagent - Main CLI Entry Point

use anyhow::{Context, Result};
use assertagent::cli::{Args, Commands, RunArgs};
use assertagent::config::Config;
use assertagent::models::{ChatModel, OpenAiClient, ScriptedModel};
use assertagent::pipeline::{load_dataset, task_range, BatchRunner, BatchSummary};
use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.verbosity().filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => Config::config_path()?,
    };

    match &args.command {
        Commands::Config { init } => show_config(&config_path, *init),
        Commands::Run(run) => run_batch(&config_path, run).await,
    }
}

fn show_config(config_path: &Path, init: bool) -> Result<()> {
    let config = if init {
        let config = Config::default();
        config.save_to(config_path)?;
        println!("{} {}", "Wrote".green(), config_path.display());
        config
    } else {
        Config::load_from(config_path)?
    };

    println!("{}", format!("# {}", config_path.display()).dimmed());
    println!("{}", toml::to_string_pretty(&config).context("Failed to render config")?);
    Ok(())
}

async fn run_batch(config_path: &Path, run: &RunArgs) -> Result<()> {
    let mut config = Config::load_from(config_path)?;
    run.apply(&mut config);

    let records = load_dataset(&run.dataset)
        .with_context(|| format!("Failed to load dataset {}", run.dataset.display()))?;
    let range = task_range(run.start, run.end, records.len());

    let model: Arc<dyn ChatModel> = match &run.replay {
        Some(path) => Arc::new(ScriptedModel::from_jsonl(path)?),
        None => Arc::new(OpenAiClient::new(&config.model)?),
    };

    println!(
        "{} {} tasks [{}..{}) with {} ({} worker{})",
        "Generating".cyan().bold(),
        range.len(),
        range.start,
        range.end,
        model.model_name(),
        run.workers,
        if run.workers == 1 { "" } else { "s" }
    );

    let progress = ProgressBar::new(range.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .context("Invalid progress template")?,
    );

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "Interrupted, finishing current turns...".yellow());
            on_interrupt.cancel();
        }
    });

    let runner = BatchRunner::new(config, run.lang, model)
        .with_workers(run.workers)
        .with_cancel(cancel)
        .with_progress(progress);
    let summary = runner.run(records, range).await?;

    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &BatchSummary) {
    println!();
    println!("{}", "Summary".bold());
    println!("  {} {}", "generated:".green(), summary.generated);
    println!("  {} {}", "skipped:  ".dimmed(), summary.skipped);
    println!("  candidates: {}", summary.candidates);

    let stats = &summary.resources;
    println!(
        "  model calls: {} ({} prompt / {} completion tokens, {:.1}s)",
        stats.llm_calls, stats.usage.prompt_tokens, stats.usage.completion_tokens, stats.llm_seconds
    );
    println!("  test runs: {} ({:.1}s)", stats.test_runs, stats.test_seconds);

    if !summary.failed.is_empty() {
        println!("  {} {}", "failed:".red().bold(), summary.failed.len());
        for (index, reason) in &summary.failed {
            println!("    {} {}", format!("#{}", index).red(), reason);
        }
    }
}
