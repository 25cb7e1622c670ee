//! JUnit XML report parsing
//!
//! Both Maven Surefire and pytest `--junitxml` write JUnit-style reports.
//! They are read into a small element tree and summarized into the text
//! shown to the reviewer.

use crate::errors::{AgentError, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;

/// Minimal XML element
#[derive(Debug, Clone, Default)]
pub struct XmlNode {
    pub name: String,
    pub attrs: HashMap<String, String>,
    pub text: String,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    fn attr_count(&self, key: &str) -> usize {
        self.attr(key).and_then(|v| v.trim().parse().ok()).unwrap_or(0)
    }

    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }
}

fn element(e: &BytesStart) -> Result<XmlNode> {
    let mut node = XmlNode {
        name: String::from_utf8_lossy(e.name().as_ref()).to_string(),
        ..Default::default()
    };
    for attr in e.attributes() {
        let attr = attr.map_err(|err| AgentError::ParseError(format!("XML attribute error: {}", err)))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let value = attr
            .unescape_value()
            .map_err(|err| AgentError::ParseError(format!("XML decode error: {}", err)))?;
        node.attrs.insert(key, value.to_string());
    }
    Ok(node)
}

/// Parse an XML document into its root element
pub fn parse_xml(xml: &str) -> Result<XmlNode> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => stack.push(element(e)?),
            Ok(Event::Empty(ref e)) => {
                let node = element(e)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => root = Some(node),
                }
            }
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|err| AgentError::ParseError(format!("XML decode error: {}", err)))?;
                if let Some(node) = stack.last_mut() {
                    node.text.push_str(&text);
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(node) = stack.last_mut() {
                    node.text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Ok(Event::End(_)) => {
                if let Some(node) = stack.pop() {
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(node),
                        None => root = Some(node),
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(AgentError::ParseError(format!("XML parsing error: {}", e))),
            _ => {}
        }
        buf.clear();
    }

    root.ok_or_else(|| AgentError::ParseError("XML document has no root element".to_string()))
}

/// Score and reviewer-facing summary of one test run
#[derive(Debug, Clone, PartialEq)]
pub struct TestReport {
    pub score: f64,
    pub passed: usize,
    pub total: usize,
    pub summary: String,
}

impl TestReport {
    /// Report for a run that produced no XML
    pub fn unparsed(summary: impl Into<String>) -> Self {
        Self {
            score: 0.0,
            passed: 0,
            total: 0,
            summary: summary.into(),
        }
    }

    /// All selected tests passed
    pub fn all_passed(&self) -> bool {
        self.total > 0 && self.passed == self.total
    }
}

/// Summarize a Surefire `TEST-<class>.xml` report
pub fn summarize_surefire(xml: &str) -> Result<TestReport> {
    let root = parse_xml(xml)?;
    let field = |key: &str| root.attr(key).unwrap_or("None").to_string();

    let mut summary = format!(
        "Test class: {}, tests: {}, failures: {}, errors: {}, skipped: {}",
        field("name"),
        field("tests"),
        field("failures"),
        field("errors"),
        field("skipped"),
    );

    let mut passed = 0;
    let mut total = 0;
    for case in root.children_named("testcase") {
        let name = case.attr("name").unwrap_or("None");
        let failure = case.child("failure");
        let error = case.child("error");

        if let Some(f) = failure {
            summary.push_str(&format!("\n  - [Failure] {}: {}", name, f.attr("message").unwrap_or("None")));
        }
        if let Some(e) = error {
            summary.push_str(&format!("\n  - [Error] {}: {}", name, e.attr("message").unwrap_or("None")));
        }
        if failure.is_none() && error.is_none() {
            summary.push_str(&format!("\n  - [Passed] {}", name));
            passed += 1;
        }
        total += 1;
    }

    Ok(TestReport {
        score: if total > 0 { passed as f64 / total as f64 } else { 0.0 },
        passed,
        total,
        summary,
    })
}

/// Summarize a pytest `--junitxml` report
pub fn summarize_pytest(xml: &str) -> Result<TestReport> {
    let root = parse_xml(xml)?;
    let suite = if root.name == "testsuite" {
        &root
    } else {
        root.child("testsuite")
            .ok_or_else(|| AgentError::ParseError("Invalid XML: No <testsuite> element found".to_string()))?
    };

    let total = suite.attr_count("tests");
    let failures = suite.attr_count("failures");
    let errors = suite.attr_count("errors");
    let skipped = suite.attr_count("skipped");
    let passed = total.saturating_sub(failures + errors + skipped);
    let score = if total > 0 { passed as f64 / total as f64 } else { 0.0 };

    let messages: Vec<String> = suite
        .children_named("testcase")
        .filter_map(|case| case.child("failure").or_else(|| case.child("error")))
        .map(|problem| {
            let lines: Vec<&str> = problem.text.lines().collect();
            let tail = &lines[lines.len().saturating_sub(4)..];
            let mut parts = vec!["...\n"];
            parts.extend_from_slice(tail);
            format!("Failure:\n{}", parts.join("\n"))
        })
        .collect();

    let mut summary = format!(
        "Total {}, Passed: {}, Failures: {}, Errors: {}, Skipped: {}\nPass Rate: {}",
        total,
        passed,
        failures,
        errors,
        skipped,
        format_score(score)
    );
    if !messages.is_empty() {
        summary.push_str("\n\nError Message:\n");
        summary.push_str(&messages.join("\n"));
    }

    Ok(TestReport {
        score,
        passed,
        total,
        summary,
    })
}

/// Render a ratio the way a float prints in reports: `1.0`, `0.5`
fn format_score(score: f64) -> String {
    if score.fract() == 0.0 {
        format!("{:.1}", score)
    } else {
        format!("{}", score)
    }
}
