//! Per-task driver: repeated cycles until enough candidates are collected

use super::graph::CycleGraph;
use crate::agent::{CycleContext, EngineSettings};
use crate::config::PipelineConfig;
use crate::errors::Result;
use crate::project::ProjectTools;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Generate candidates for one task, then close the project tools
///
/// `existing` candidates are kept at the front of the returned list and
/// shown to every cycle as answers to avoid. Cycles whose writer gave up
/// add nothing, so the list may stay shorter than `nums`. The test file is
/// restored on every path; a failed restore wins over a generation error.
pub async fn run_task(
    tools: Arc<ProjectTools>,
    settings: &EngineSettings,
    pipeline: &PipelineConfig,
    existing: Vec<String>,
) -> Result<Vec<String>> {
    let generated = generate(&tools, settings, pipeline, existing).await;
    let closed = tools.close().await;

    if let (Err(e), Err(_)) = (&generated, &closed) {
        error!(task = tools.context().index, error = %e, "generation failed before the restore failure");
    }
    closed?;
    generated
}

async fn generate(
    tools: &Arc<ProjectTools>,
    settings: &EngineSettings,
    pipeline: &PipelineConfig,
    existing: Vec<String>,
) -> Result<Vec<String>> {
    let index = tools.context().index;
    if pipeline.needs_debugger() && !tools.start_debugger().await {
        warn!(task = index, "debugger unavailable, verifying statically only");
    }

    let mut candidates = existing;
    let mut tries = 0;
    while tries < pipeline.max_tries && candidates.len() < pipeline.nums {
        if settings.cancel.is_cancelled() {
            warn!(task = index, "cancelled, stopping before the next cycle");
            break;
        }

        let gen_id = settings.log.begin_generation();
        let mut cycle = CycleContext::new(tools.clone(), gen_id.clone(), candidates.clone());
        let mut graph = CycleGraph::build(settings, tools, pipeline);
        let candidate = graph.run(&mut cycle).await?;

        if candidate.is_empty() {
            warn!(task = index, gen_id = %gen_id, "cycle produced no candidate");
        } else {
            info!(task = index, gen_id = %gen_id, candidate = %candidate, "cycle produced a candidate");
            candidates.push(candidate);
        }
        tries += 1;
    }

    Ok(candidates)
}
