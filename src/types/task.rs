//! Task records and the immutable per-task context
//!
//! A `TaskRecord` is one dataset row as stored on disk. `TaskContext` is
//! what the pipeline actually consumes: absolute paths, the rewritten
//! placeholder, runner identifiers and scratch directories.

use crate::config::PathsConfig;
use crate::errors::{AgentError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Marker left by the dataset where the assertion was removed
pub const RAW_PLACEHOLDER: &str = "<AssertPlaceHolder>";

/// Source roots used to derive Maven module and package names
pub const JAVA_SOURCE_ROOTS: [&str; 2] = ["src/main/java", "src/test/java"];

/// Target language of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    Java,
    Python,
}

impl Language {
    /// Markdown fence tag
    pub fn fence(&self) -> &'static str {
        match self {
            Language::Java => "java",
            Language::Python => "python",
        }
    }

    /// Placeholder as it appears in dataset rows
    pub fn raw_placeholder(&self) -> &'static str {
        match self {
            Language::Java => "<AssertPlaceHolder>;",
            Language::Python => RAW_PLACEHOLDER,
        }
    }

    /// Placeholder rewritten so the masked file stays compilable
    pub fn placeholder(&self) -> &'static str {
        match self {
            Language::Java => "// <AssertPlaceHolder>;",
            Language::Python => "... # <AssertPlaceHolder>",
        }
    }

    /// Line prefixes that mark an existing assertion statement
    pub fn assert_prefixes(&self) -> &'static [&'static str] {
        match self {
            Language::Java => &["assert", "Assert.", "org.junit.Assert."],
            Language::Python => &["assert", "self.assert"],
        }
    }

    /// Qualify a Java assertion with `org.junit.Assert.`; Python is left alone
    pub fn normalize_assert(&self, assert_code: &str) -> String {
        match self {
            Language::Java => {
                let bare = strip_assert_qualifier(assert_code.trim());
                format!("org.junit.Assert.{}", bare)
            }
            Language::Python => assert_code.to_string(),
        }
    }
}

/// Remove an `org.junit.Assert.` or `Assert.` qualifier wherever it occurs
pub fn strip_assert_qualifier(code: &str) -> String {
    code.replace("org.junit.Assert.", "").replace("Assert.", "")
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::Java => write!(f, "Java"),
            Language::Python => write!(f, "Python"),
        }
    }
}

impl std::str::FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "java" => Ok(Language::Java),
            "python" | "py" => Ok(Language::Python),
            other => Err(format!("Unknown language: {}", other)),
        }
    }
}

/// A piece of source text and the 1-based line span it occupies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeFragment {
    pub text: String,
    pub start_line: usize,
    pub end_line: usize,
}

impl CodeFragment {
    pub fn new(text: impl Into<String>, start_line: usize, end_line: usize) -> Self {
        Self {
            text: text.into(),
            start_line,
            end_line,
        }
    }

    /// Fragment text with `[n] ` line prefixes
    pub fn numbered(&self) -> String {
        crate::syntax::number_lines(&self.text, self.start_line)
    }
}

/// Test setup fragment as stored in Java dataset rows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupRecord {
    pub test_setup: String,
    pub start_lineno: usize,
    pub end_lineno: usize,
}

/// One dataset row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub repo_name: String,
    pub test_target: String,

    pub focal_method: String,
    pub focal_method_file_path: String,
    pub focal_method_start_lineno: usize,
    pub focal_method_end_lineno: usize,

    #[serde(default)]
    pub test_setup: String,
    #[serde(default)]
    pub test_setup_file_path: String,
    #[serde(default)]
    pub test_setup_start_lineno: Option<usize>,
    #[serde(default)]
    pub test_setup_end_lineno: Option<usize>,
    #[serde(default)]
    pub test_setup_list: Vec<SetupRecord>,

    pub test_prefix: String,
    pub test_prefix_file_path: String,
    pub test_prefix_start_lineno: usize,
    pub test_prefix_end_lineno: usize,

    #[serde(default)]
    pub ground_truth_oracle: String,
    #[serde(default)]
    pub ground_truth_oracle_lineno: Option<usize>,
}

/// Immutable per-task context built once before any agent runs
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub index: usize,
    pub language: Language,

    pub repo_name: String,
    pub repo_path: PathBuf,

    /// Maven module directory relative to the repository, empty for Python
    pub sub_repo: String,
    /// Fully qualified test class (Java) or test file stem (Python)
    pub test_class: String,
    /// Runner target, e.g. `pkg.FooTest#testBar` or `tests/test_foo.py::test_bar`
    pub test_target: String,

    pub focal_method: CodeFragment,
    pub focal_method_file: String,
    pub test_setup: Vec<CodeFragment>,
    /// Test method with the placeholder already rewritten
    pub test_prefix: CodeFragment,
    pub test_prefix_file: String,

    pub placeholder: String,
    /// 1-based line of the placeholder in the test file
    pub oracle_line: usize,
    pub ground_truth_oracle: String,

    pub calls_extract_dir: PathBuf,
    pub agent_cache_dir: PathBuf,
    pub debug_cache_dir: PathBuf,
}

impl TaskContext {
    /// Build the context for dataset row `index`
    pub fn from_record(
        index: usize,
        record: &TaskRecord,
        language: Language,
        paths: &PathsConfig,
    ) -> Result<Self> {
        let repo_path = absolute(&paths.repo_cache_dir.join(&record.repo_name))?;
        let placeholder = language.placeholder().to_string();
        let prefix_text = record
            .test_prefix
            .replace(language.raw_placeholder(), &placeholder);

        let placeholder_offset = crate::syntax::find_line(&prefix_text, &placeholder).ok_or_else(|| {
            AgentError::ParseError(format!(
                "test prefix of task {} has no `{}` line",
                index,
                language.raw_placeholder()
            ))
        })?;

        let (sub_repo, test_class, oracle_line, test_setup) = match language {
            Language::Java => {
                let (sub_repo, pkg) = java_path_to_pkg(&record.test_prefix_file_path);
                let setup = if record.test_setup_list.is_empty() {
                    python_setup(record)
                } else {
                    record
                        .test_setup_list
                        .iter()
                        .map(|s| CodeFragment::new(s.test_setup.clone(), s.start_lineno, s.end_lineno))
                        .collect()
                };
                (
                    sub_repo,
                    pkg,
                    record.test_prefix_start_lineno + placeholder_offset,
                    setup,
                )
            }
            Language::Python => {
                let stem = Path::new(&record.test_prefix_file_path)
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_default();
                let oracle = record
                    .ground_truth_oracle_lineno
                    .unwrap_or(record.test_prefix_start_lineno + placeholder_offset);
                (String::new(), stem, oracle, python_setup(record))
            }
        };

        Ok(Self {
            index,
            language,
            repo_name: record.repo_name.clone(),
            repo_path,
            sub_repo,
            test_class,
            test_target: record.test_target.clone(),
            focal_method: CodeFragment::new(
                record.focal_method.clone(),
                record.focal_method_start_lineno,
                record.focal_method_end_lineno,
            ),
            focal_method_file: record.focal_method_file_path.clone(),
            test_setup,
            test_prefix: CodeFragment::new(
                prefix_text,
                record.test_prefix_start_lineno,
                record.test_prefix_end_lineno,
            ),
            test_prefix_file: record.test_prefix_file_path.clone(),
            placeholder,
            oracle_line,
            ground_truth_oracle: record.ground_truth_oracle.clone(),
            calls_extract_dir: paths.calls_extract_dir.clone(),
            agent_cache_dir: paths.agent_cache_dir.clone(),
            debug_cache_dir: paths.debug_cache_dir.clone(),
        })
    }

    /// Absolute path of the test file under completion
    pub fn test_file_path(&self) -> PathBuf {
        self.repo_path.join(&self.test_prefix_file)
    }

    /// Directory the test runner is launched from
    pub fn runner_dir(&self) -> PathBuf {
        if self.sub_repo.is_empty() {
            self.repo_path.clone()
        } else {
            self.repo_path.join(&self.sub_repo)
        }
    }

    /// Setup fragments rendered with line numbers, joined by ellipsis lines
    pub fn numbered_setup(&self) -> String {
        self.test_setup
            .iter()
            .map(CodeFragment::numbered)
            .collect::<Vec<_>>()
            .join("\n...\n")
    }
}

fn python_setup(record: &TaskRecord) -> Vec<CodeFragment> {
    if record.test_setup.trim().is_empty() {
        return Vec::new();
    }
    let start = record.test_setup_start_lineno.unwrap_or(1);
    let end = record
        .test_setup_end_lineno
        .unwrap_or(start + record.test_setup.lines().count().saturating_sub(1));
    vec![CodeFragment::new(record.test_setup.clone(), start, end)]
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Split a Java source path into (module directory, dotted class name)
pub fn java_path_to_pkg(file_path: &str) -> (String, String) {
    let stem = file_path.strip_suffix(".java").unwrap_or(file_path);
    for root in JAVA_SOURCE_ROOTS {
        if let Some(idx) = stem.find(root) {
            let pkg = stem[idx + root.len()..].trim_matches('/').replace('/', ".");
            let sub_repo = stem[..idx].trim_matches('/').to_string();
            return (sub_repo, pkg);
        }
    }
    (String::new(), String::new())
}
