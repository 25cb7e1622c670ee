//! Explorer: call-graph and style summaries for the writer and reviewer
//!
//! Runs once per cycle and never enters the review loop. Three artifacts
//! are produced, each cached on disk under
//! `{agent_cache_dir}/ExploreAgent/{repo}` so later cycles and reruns of
//! the same task skip the model:
//!
//! - `func-{file}:{line}.json`: callee summaries of the method under test
//! - `func-{file}:{line}.json`: callee summaries of the test prefix, limited
//!   to calls made before the placeholder line
//! - `style-{file}:{line}.txt`: assertion style of the current test file
//!
//! Call lists come from precomputed JSON at
//! `{calls_extract_dir}/{repo}/{file}:{line}.json`. A missing call list
//! yields no callees.

use super::cycle::CycleContext;
use super::engine::{AgentEngine, EngineSettings};
use crate::errors::Result;
use crate::syntax::{assert_style_preview, function_body_containing};
use crate::types::{ExploreNotes, Language, TaskContext};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const EXPLORER_NAME: &str = "ExploreAgent";

/// Summary text used when no callee could be resolved
pub const NO_CALLEES: &str = "(empty)";

#[derive(Debug, Deserialize)]
struct CallFile {
    #[serde(default)]
    calls: Vec<CallSite>,
}

#[derive(Debug, Deserialize)]
struct CallSite {
    /// 0-based line of the call
    #[serde(default)]
    start_line: Option<usize>,
    #[serde(default)]
    line: Option<usize>,
    #[serde(default)]
    definition: Option<Definition>,
}

#[derive(Debug, Deserialize)]
struct Definition {
    rel_file_path: String,
    /// 0-based line of the definition
    start_line: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct CalleeCache {
    callees: String,
}

/// `a/b/C.java`, 12 → `a-b-C.java:12`
fn artifact_key(file: &str, line: usize) -> String {
    format!("{}:{}", file.replace('/', "-"), line)
}

pub struct ExplorerAgent {
    callee_engine: AgentEngine,
    style_engine: AgentEngine,
    language: Language,
    max_callees: usize,
    max_style_functions: usize,
}

impl ExplorerAgent {
    pub fn new(settings: EngineSettings, language: Language, max_callees: usize, max_style_functions: usize) -> Self {
        let (unit, tests) = match language {
            Language::Java => ("Java method or class", "Java test methods"),
            Language::Python => ("Python function or class", "Python functions"),
        };
        let callee_prompt = format!(
            "You are a professional software engineer.\nYou can summarize the functionality of a provided {}.\nSummarize in 2-4 sentences.",
            unit
        );
        let style_prompt = format!(
            "You are a professional software engineer.\nYou can summarize the writing style and habits of assert statements in the provided {}.\n\
             You should list them in points, using clear and concise language, and you can use some assert examples to clarify.",
            tests
        );

        Self {
            callee_engine: AgentEngine::new(EXPLORER_NAME, callee_prompt, settings.clone()),
            style_engine: AgentEngine::new(EXPLORER_NAME, style_prompt, settings),
            language,
            max_callees,
            max_style_functions,
        }
    }

    pub async fn explore(&mut self, cycle: &CycleContext) -> Result<ExploreNotes> {
        let ctx = cycle.task();
        let cache_dir = ctx.agent_cache_dir.join(EXPLORER_NAME).join(&ctx.repo_name);
        tokio::fs::create_dir_all(&cache_dir).await?;

        let focal_callees = self
            .cached_callees(ctx, &cache_dir, &ctx.focal_method_file, ctx.focal_method.start_line, None)
            .await?;
        let prefix_callees = self
            .cached_callees(
                ctx,
                &cache_dir,
                &ctx.test_prefix_file,
                ctx.test_prefix.start_line,
                Some(ctx.oracle_line),
            )
            .await?;
        let style = self.cached_style(ctx, &cache_dir).await?;

        info!(task = ctx.index, "exploration finished");
        Ok(ExploreNotes {
            explore_focal_method: format!("### Callees\n{}\n", focal_callees),
            explore_test_prefix: format!("### Callees\n{}\n", prefix_callees),
            explore_assert_style: style,
        })
    }

    async fn cached_callees(
        &mut self,
        ctx: &TaskContext,
        cache_dir: &Path,
        file: &str,
        start_line: usize,
        boundary: Option<usize>,
    ) -> Result<String> {
        let key = artifact_key(file, start_line);
        let cache_file = cache_dir.join(format!("func-{}.json", key));
        if let Some(cached) = read_cache::<CalleeCache>(&cache_file).await {
            debug!(file = %cache_file.display(), "callee summaries served from cache");
            return Ok(cached.callees);
        }

        let call_file = ctx.calls_extract_dir.join(&ctx.repo_name).join(format!("{}.json", key));
        let calls = load_calls(&call_file).await;
        let callees = self.summarize_callees(ctx, &calls, boundary).await?;

        let payload = serde_json::to_string(&CalleeCache { callees: callees.clone() })?;
        tokio::fs::write(&cache_file, payload).await?;
        Ok(callees)
    }

    async fn summarize_callees(&mut self, ctx: &TaskContext, calls: &[CallSite], boundary: Option<usize>) -> Result<String> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut summary = String::new();

        for call in calls {
            if seen.len() >= self.max_callees {
                break;
            }
            let Some(definition) = &call.definition else {
                continue;
            };
            if let Some(limit) = boundary {
                let line = call.start_line.or(call.line).unwrap_or(0);
                if limit < line + 1 {
                    continue;
                }
            }

            let path: PathBuf = ctx.repo_path.join(&definition.rel_file_path);
            let Ok(code) = tokio::fs::read_to_string(&path).await else {
                continue;
            };
            let body = match function_body_containing(self.language, &code, definition.start_line + 1) {
                Ok(Some(body)) => body,
                Ok(None) => continue,
                Err(e) => {
                    debug!(file = %path.display(), error = %e, "callee not parseable");
                    continue;
                }
            };
            if !seen.insert(format!("{}:{}", path.display(), body.span.start_line)) {
                continue;
            }

            let prompt = format!("### Target\n\n```{}\n{}\n```\n", self.language.fence(), body.preview);
            let reply = self.callee_engine.ask_once(&prompt).await?;

            let lines: Vec<&str> = code.lines().collect();
            let end = body.span.body_start_line.min(lines.len());
            let start = body.span.start_line.saturating_sub(1).min(end);
            let signature = lines[start..end].join("\n");
            summary.push_str(&format!("{}: {}\n{}\n\n", seen.len(), signature.trim(), reply));
        }

        if summary.is_empty() {
            summary = NO_CALLEES.to_string();
        }
        Ok(summary)
    }

    async fn cached_style(&mut self, ctx: &TaskContext, cache_dir: &Path) -> Result<String> {
        let cache_file = cache_dir.join(format!(
            "style-{}.txt",
            artifact_key(&ctx.test_prefix_file, ctx.test_prefix.start_line)
        ));
        if let Ok(style) = tokio::fs::read_to_string(&cache_file).await {
            return Ok(style);
        }

        // the file on disk is masked, so the oracle cannot leak into the sample
        let source = tokio::fs::read_to_string(ctx.test_file_path()).await?;
        let preview = assert_style_preview(
            self.language,
            &source,
            &ctx.test_prefix.text,
            &ctx.placeholder,
            self.max_style_functions,
        )?;
        let noun = match self.language {
            Language::Java => "methods",
            Language::Python => "functions",
        };
        let prompt = format!(
            "Please summarize the writing style and habits of assert statements in the following test {}:\n\n{}\n",
            noun, preview
        );
        let style = self.style_engine.ask_once(&prompt).await?;
        tokio::fs::write(&cache_file, &style).await?;
        Ok(style)
    }
}

async fn read_cache<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    let contents = tokio::fs::read_to_string(path).await.ok()?;
    match serde_json::from_str(&contents) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(file = %path.display(), error = %e, "ignoring unreadable explorer cache");
            None
        }
    }
}

async fn load_calls(path: &Path) -> Vec<CallSite> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(_) => {
            debug!(file = %path.display(), "no call list");
            return Vec::new();
        }
    };
    match serde_json::from_str::<CallFile>(&contents) {
        Ok(file) => file.calls,
        Err(e) => {
            warn!(file = %path.display(), error = %e, "unreadable call list");
            Vec::new()
        }
    }
}
