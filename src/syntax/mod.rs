//! Source text utilities
//!
//! Line-oriented helpers shared by prompts, masking and static checks,
//! plus tree-sitter span extraction, fenced block parsing and TF-IDF
//! ranking of test functions.

pub mod blocks;
pub mod ranking;
pub mod spans;

pub use blocks::{extract_blocks, extract_last_block};
pub use ranking::{assert_style_preview, TfIdfRanker};
pub use spans::{
    function_body_containing, function_ranges, insert_python_breakpoint, is_valid_statement,
    FunctionBody, FunctionSpan, SpanKind,
};

/// Prefix every line with `[n] `, counting from `start_line`
pub fn number_lines(text: &str, start_line: usize) -> String {
    text.lines()
        .enumerate()
        .map(|(i, line)| format!("[{}] {}", start_line + i, line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Replace 1-based lines `start..=end` of `file` with `code`
///
/// Lines are rejoined with `\n`; a trailing newline of `file` is not kept.
pub fn replace_lines(file: &str, code: &str, start: usize, end: usize) -> String {
    let lines: Vec<&str> = file.lines().collect();
    let head_end = start.saturating_sub(1).min(lines.len());
    let tail_start = end.min(lines.len()).max(head_end);

    let mut out: Vec<&str> = Vec::with_capacity(lines.len());
    out.extend_from_slice(&lines[..head_end]);
    out.extend(code.lines());
    out.extend_from_slice(&lines[tail_start..]);
    out.join("\n")
}

/// 0-based index of the first line whose trimmed text equals `needle`
pub fn find_line(text: &str, needle: &str) -> Option<usize> {
    text.lines().position(|line| line.trim() == needle)
}

/// Remove the common leading whitespace of all non-blank lines
pub fn dedent(text: &str) -> String {
    let indent = min_indent(text);
    text.lines()
        .map(|line| skip_chars(line, indent))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Smallest indentation (in chars) over non-blank lines
pub fn min_indent(text: &str) -> usize {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(leading_ws)
        .min()
        .unwrap_or(0)
}

pub(crate) fn leading_ws(line: &str) -> usize {
    line.chars().take_while(|c| c.is_whitespace()).count()
}

fn skip_chars(line: &str, n: usize) -> &str {
    match line.char_indices().nth(n) {
        Some((idx, _)) => &line[idx..],
        None => "",
    }
}

/// Last `n` lines of `text`, trimmed
pub fn last_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.trim().lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n").trim().to_string()
}

/// Cut `text` to `max` chars, marking the cut with `...`
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
