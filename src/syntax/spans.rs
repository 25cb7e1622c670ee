//! Function and class spans via tree-sitter
//!
//! Spans carry 1-based line numbers. A span's start is pulled up over
//! directly preceding comments and decorators. Functions nested inside
//! other functions are not reported.

use super::{leading_ws, min_indent};
use crate::errors::{AgentError, Result};
use crate::types::task::strip_assert_qualifier;
use crate::types::Language;
use std::collections::HashSet;
use tree_sitter::{Node, Parser, Point, Tree};

/// Classes up to this many lines are previewed verbatim
const VERBATIM_CLASS_LINES: usize = 100;

const COMMENT_KINDS: [&str; 4] = ["comment", "block_comment", "line_comment", "decorator"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanKind {
    Class,
    Method,
    Constructor,
}

/// One class, method or constructor in a source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSpan {
    pub kind: SpanKind,
    pub name: String,
    pub start_line: usize,
    pub end_line: usize,
    pub body_start_line: usize,
    pub body_end_line: usize,
    /// Index of the enclosing span in the same result vector
    pub parent: Option<usize>,
    pub children: Vec<usize>,
}

/// The innermost span around a line, with a prompt-ready preview
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionBody {
    pub span: FunctionSpan,
    pub preview: String,
}

/// Parse `source` with the grammar for `language`
pub fn parse(language: Language, source: &str) -> Result<Tree> {
    let grammar: tree_sitter::Language = match language {
        Language::Java => tree_sitter_java::LANGUAGE.into(),
        Language::Python => tree_sitter_python::LANGUAGE.into(),
    };
    let mut parser = Parser::new();
    parser
        .set_language(&grammar)
        .map_err(|e| AgentError::ParseError(format!("Failed to set {} grammar: {}", language, e)))?;
    parser
        .parse(source, None)
        .ok_or_else(|| AgentError::ParseError(format!("Failed to parse {} source", language)))
}

fn span_kind(language: Language, kind: &str) -> Option<SpanKind> {
    match (language, kind) {
        (Language::Java, "class_declaration")
        | (Language::Java, "interface_declaration")
        | (Language::Java, "enum_declaration") => Some(SpanKind::Class),
        (Language::Java, "method_declaration") => Some(SpanKind::Method),
        (Language::Java, "constructor_declaration") => Some(SpanKind::Constructor),
        (Language::Python, "class_definition") => Some(SpanKind::Class),
        (Language::Python, "function_definition") => Some(SpanKind::Method),
        _ => None,
    }
}

fn stops_descent(language: Language, kind: &str) -> bool {
    match language {
        Language::Java => matches!(kind, "method_declaration" | "constructor_declaration"),
        Language::Python => kind == "function_definition",
    }
}

/// All class and function spans of `source`, in document order
pub fn function_ranges(language: Language, source: &str) -> Result<Vec<FunctionSpan>> {
    let tree = parse(language, source)?;
    let mut spans = Vec::new();
    collect(language, tree.root_node(), source.as_bytes(), None, &mut spans);
    Ok(spans)
}

fn collect(
    language: Language,
    node: Node,
    src: &[u8],
    parent: Option<usize>,
    spans: &mut Vec<FunctionSpan>,
) {
    let mut current = parent;

    if let Some(kind) = span_kind(language, node.kind()) {
        let name = node
            .child_by_field_name("name")
            .and_then(|n| n.utf8_text(src).ok());
        if let Some(name) = name {
            let end_line = node.end_position().row + 1;
            let (body_start_line, body_end_line) = node
                .child_by_field_name("body")
                .map(|b| (b.start_position().row + 1, b.end_position().row + 1))
                .unwrap_or((end_line, end_line));
            let anchor = node
                .parent()
                .filter(|p| p.kind() == "decorated_definition")
                .unwrap_or(node);
            let mut start_line = anchor.start_position().row + 1;
            if let Some(comment_line) = preceding_comment_line(anchor) {
                start_line = start_line.min(comment_line);
            }

            let idx = spans.len();
            spans.push(FunctionSpan {
                kind,
                name: name.to_string(),
                start_line,
                end_line,
                body_start_line,
                body_end_line,
                parent,
                children: Vec::new(),
            });
            if let Some(p) = parent {
                spans[p].children.push(idx);
            }
            current = Some(idx);
        }
    }

    if stops_descent(language, node.kind()) {
        return;
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect(language, child, src, current, spans);
    }
}

/// First line of the comment/decorator run directly above `node`
fn preceding_comment_line(node: Node) -> Option<usize> {
    let mut start = None;
    let mut sibling = node.prev_sibling();

    while let Some(s) = sibling {
        if COMMENT_KINDS.contains(&s.kind()) {
            // trailing comment of the previous statement
            let trailing = s
                .prev_sibling()
                .map(|p| {
                    !COMMENT_KINDS.contains(&p.kind())
                        && p.end_position().row == s.start_position().row
                })
                .unwrap_or(false);
            if trailing {
                break;
            }
            if s.end_position().row < node.start_position().row {
                start = Some(s.start_position().row + 1);
            }
        } else if !matches!(s.kind(), ";" | "empty_statement") {
            break;
        }
        sibling = s.prev_sibling();
    }

    start
}

/// Innermost span containing 1-based `line`, rendered for a prompt
///
/// Methods are shown verbatim. Classes over a hundred lines, Java
/// constructors and Python `__init__` are shown with sibling bodies folded.
pub fn function_body_containing(
    language: Language,
    source: &str,
    line: usize,
) -> Result<Option<FunctionBody>> {
    let spans = function_ranges(language, source)?;

    let mut target: Option<usize> = None;
    for (i, span) in spans.iter().enumerate() {
        if span.start_line <= line
            && line <= span.end_line
            && target.map_or(true, |t| span.start_line > spans[t].start_line)
        {
            target = Some(i);
        }
    }
    let Some(target) = target else {
        return Ok(None);
    };

    let span = &spans[target];
    let lines: Vec<&str> = source.lines().collect();
    let folded = match span.kind {
        SpanKind::Class => span.end_line - span.start_line + 1 > VERBATIM_CLASS_LINES,
        SpanKind::Constructor => true,
        SpanKind::Method => language == Language::Python && span.name == "__init__",
    };

    let preview = if folded {
        let preview = folded_preview(language, &lines, &spans, target);
        strip_leading_imports(language, &strip_leading_comments(language, &preview))
    } else {
        let end = span.end_line.min(lines.len());
        let start = (span.start_line - 1).min(end);
        lines[start..end].join("\n")
    };

    Ok(Some(FunctionBody {
        span: span.clone(),
        preview,
    }))
}

fn fold_marker(language: Language) -> &'static str {
    match language {
        Language::Java => " /* Folded */ }",
        Language::Python => " ... # Folded",
    }
}

/// File view that keeps the target, folds its members and elides the rest
fn folded_preview(language: Language, source: &[&str], spans: &[FunctionSpan], target: usize) -> String {
    let mut lines: Vec<String> = source.iter().map(|l| l.to_string()).collect();
    let anchor = spans[target].start_line;

    let shown: HashSet<usize> = spans
        .iter()
        .enumerate()
        .filter(|(i, s)| {
            *i == target
                || (s.children.is_empty() && s.start_line <= anchor && anchor <= s.end_line)
        })
        .map(|(i, _)| i)
        .collect();

    let mut order: Vec<usize> = (0..spans.len()).collect();
    order.sort_by_key(|&i| spans[i].start_line);

    let mut out: Vec<String> = Vec::new();
    let mut cursor = 0usize;
    let mut has_split = false;

    for i in order {
        let span = &spans[i];
        if shown.contains(&i) || span.children.iter().any(|c| shown.contains(c)) {
            has_split = false;
            continue;
        }

        if span.parent.map_or(false, |p| shown.contains(&p)) {
            let upto = span.body_start_line.min(lines.len());
            if upto > 0 && upto - 1 >= cursor {
                lines[upto - 1].push_str(fold_marker(language));
            }
            if cursor < upto {
                out.extend(lines[cursor..upto].iter().cloned());
            }
            cursor = cursor.max(span.end_line);
            has_split = false;
        } else {
            let upto = (span.start_line - 1).min(lines.len());
            if cursor < upto {
                out.extend(lines[cursor..upto].iter().cloned());
            }
            cursor = cursor.max(span.end_line);
            if !has_split {
                out.push("...".to_string());
                has_split = true;
            }
        }
    }
    if cursor < lines.len() {
        out.extend(lines[cursor..].iter().cloned());
    }

    // collapse runs of blank lines
    let mut collapsed: Vec<String> = Vec::with_capacity(out.len());
    let mut in_blank = false;
    for line in out {
        let blank = line.trim().is_empty();
        if blank && in_blank {
            continue;
        }
        in_blank = blank;
        collapsed.push(line);
    }
    collapsed.join("\n").trim_end().to_string()
}

fn strip_leading_comments(language: Language, preview: &str) -> String {
    let lines: Vec<&str> = preview.lines().collect();
    let mut j = 0;
    while j < lines.len() && lines[j].trim().is_empty() {
        j += 1;
    }
    if j >= lines.len() {
        return preview.to_string();
    }

    let first = lines[j].trim();
    let (open, close) = match language {
        Language::Python => ("\"\"\"", "\"\"\""),
        Language::Java => ("/*", "*/"),
    };
    if first.starts_with(open) {
        let single_line = first.len() >= open.len() + close.len() && first.ends_with(close);
        if single_line {
            j += 1;
        } else {
            j += 1;
            while j < lines.len() && !lines[j].trim().ends_with(close) {
                j += 1;
            }
            j = (j + 1).min(lines.len());
        }
    } else if language == Language::Java && first.starts_with("//") {
        while j < lines.len() && lines[j].trim().starts_with("//") {
            j += 1;
        }
    } else {
        return preview.to_string();
    }
    lines[j..].join("\n")
}

fn strip_leading_imports(language: Language, preview: &str) -> String {
    let is_import = |line: &str| match language {
        Language::Python => line.starts_with("from ") || line.starts_with("import "),
        Language::Java => line.starts_with("import ") || line.starts_with("package "),
    };
    let lines: Vec<&str> = preview.lines().collect();
    let mut j = 0;
    while j < lines.len() && lines[j].trim().is_empty() {
        j += 1;
    }
    if j < lines.len() && is_import(lines[j].trim_start()) {
        while j < lines.len() && (is_import(lines[j].trim_start()) || lines[j].trim().is_empty()) {
            j += 1;
        }
        return lines[j..].join("\n");
    }
    preview.to_string()
}

/// Whether `code` parses as a single statement in `language`
pub fn is_valid_statement(language: Language, code: &str) -> bool {
    let source = match language {
        Language::Python => code.trim().to_string(),
        Language::Java => format!(
            "class Example {{\nvoid test() {{\n{}\n}}\n}}",
            strip_assert_qualifier(code)
        ),
    };
    parse(language, &source)
        .map(|tree| !tree.root_node().has_error())
        .unwrap_or(false)
}

/// Insert `breakpoint()` at 1-based `line` of a Python test function
///
/// The placeholder line itself is replaced. When the line sits inside a
/// `try` statement, the breakpoint goes right before the innermost `try`
/// so the debugger stops even if the body raises.
pub fn insert_python_breakpoint(test_prefix: &str, line: usize) -> Result<String> {
    let indent = min_indent(test_prefix);
    let body = super::dedent(test_prefix);
    let mut lines: Vec<String> = body.lines().map(String::from).collect();
    if line == 0 || line > lines.len() {
        return Err(AgentError::ParseError(format!(
            "breakpoint line {} outside test function of {} lines",
            line,
            lines.len()
        )));
    }

    let tree = parse(Language::Python, &body)?;
    let row = line - 1;
    let point = Point::new(row, leading_ws(&lines[row]));
    let try_row = tree
        .root_node()
        .descendant_for_point_range(point, point)
        .and_then(enclosing_try)
        .map(|t| t.start_position().row);

    match try_row {
        Some(r) if r < row => {
            let ws: String = lines[r].chars().take_while(|c| c.is_whitespace()).collect();
            lines.insert(r, format!("{}breakpoint()", ws));
        }
        _ => {
            let ws: String = lines[row].chars().take_while(|c| c.is_whitespace()).collect();
            lines[row] = format!("{}breakpoint()", ws);
        }
    }

    let pad = " ".repeat(indent);
    Ok(lines
        .iter()
        .map(|l| format!("{}{}", pad, l))
        .collect::<Vec<_>>()
        .join("\n"))
}

fn enclosing_try(node: Node) -> Option<Node> {
    let mut current = Some(node);
    while let Some(n) = current {
        if n.kind() == "try_statement" {
            return Some(n);
        }
        current = n.parent();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const PY_SOURCE: &str = "import os\n\n\nclass Calc:\n    def add(self, a, b):\n        def inner():\n            return 0\n        return a + b\n\n    @staticmethod\n    def neg(a):\n        return -a\n\n\ndef free():\n    return 1\n";

    const JAVA_SOURCE: &str = "package org.acme;\n\npublic class Calc {\n    private int base;\n\n    /** Creates a calc. */\n    public Calc(int base) {\n        this.base = base;\n    }\n\n    public int add(int a) {\n        return base + a;\n    }\n}\n";

    #[test]
    fn test_python_ranges() {
        let spans = function_ranges(Language::Python, PY_SOURCE).unwrap();
        let names: Vec<&str> = spans.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Calc", "add", "neg", "free"]);

        let add = &spans[1];
        assert_eq!(add.kind, SpanKind::Method);
        assert_eq!(add.start_line, 5);
        assert_eq!(add.end_line, 8, "nested function stays inside its parent");
        assert_eq!(add.parent, Some(0));

        let neg = &spans[2];
        assert_eq!(neg.start_line, 10, "decorator is part of the span");
        assert_eq!(neg.body_start_line, 12);
        assert_eq!(spans[0].children, vec![1, 2]);
        assert_eq!(spans[3].parent, None);
    }

    #[test]
    fn test_java_ranges_and_constructor_preview() {
        let spans = function_ranges(Language::Java, JAVA_SOURCE).unwrap();
        let kinds: Vec<SpanKind> = spans.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec![SpanKind::Class, SpanKind::Constructor, SpanKind::Method]);
        assert_eq!(spans[1].start_line, 6);

        let body = function_body_containing(Language::Java, JAVA_SOURCE, 8)
            .unwrap()
            .unwrap();
        assert_eq!(body.span.kind, SpanKind::Constructor);
        assert!(body.preview.contains("this.base = base;"));
        assert!(body.preview.contains("..."));
        assert!(!body.preview.contains("return base + a;"));
        assert!(!body.preview.contains("package org.acme;"));
    }

    #[test]
    fn test_method_preview_is_verbatim() {
        let body = function_body_containing(Language::Python, PY_SOURCE, 16)
            .unwrap()
            .unwrap();
        assert_eq!(body.preview, "def free():\n    return 1");
        assert!(function_body_containing(Language::Python, PY_SOURCE, 1).unwrap().is_none());
    }

    #[test]
    fn test_statement_validity() {
        assert!(is_valid_statement(Language::Python, "assert x == 1"));
        assert!(!is_valid_statement(Language::Python, "assert x =="));
        assert!(is_valid_statement(Language::Java, "org.junit.Assert.assertEquals(1, x);"));
        assert!(!is_valid_statement(Language::Java, "assertEquals(1, x"));
    }

    #[test]
    fn test_breakpoint_replaces_placeholder() {
        let prefix = "    def test_a(self):\n        x = 1\n        ... # <AssertPlaceHolder>";
        let out = insert_python_breakpoint(prefix, 3).unwrap();
        assert_eq!(out, "    def test_a(self):\n        x = 1\n        breakpoint()");
    }

    #[test]
    fn test_breakpoint_goes_before_try() {
        let prefix = "def test_b():\n    x = 1\n    try:\n        ... # <AssertPlaceHolder>\n    except ValueError:\n        pass";
        let out = insert_python_breakpoint(prefix, 4).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[2], "    breakpoint()");
        assert_eq!(lines[3], "    try:");
        assert_eq!(lines[4], "        ... # <AssertPlaceHolder>");
    }
}
