//! TF-IDF ranking of test functions against the test under work
//!
//! Term weighting follows the common smoothed scheme:
//! - tokens are lowercased words of two or more characters
//! - idf = ln((1 + n) / (1 + df)) + 1
//! - document vectors are L2-normalized, similarity is their dot product

use super::{dedent, spans::function_ranges, SpanKind};
use crate::errors::Result;
use crate::types::Language;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

fn token_pattern() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| Regex::new(r"\b\w\w+\b").expect("valid regex"))
}

fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    token_pattern()
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .collect()
}

type SparseVector = HashMap<String, f64>;

/// Vector space fitted over a fixed corpus plus one query
#[derive(Debug, Clone)]
pub struct TfIdfRanker {
    documents: Vec<SparseVector>,
    query: SparseVector,
}

impl TfIdfRanker {
    /// Fit idf weights over `documents` and `query` together
    pub fn fit<S: AsRef<str>>(documents: &[S], query: &str) -> Self {
        let mut token_lists: Vec<Vec<String>> =
            documents.iter().map(|d| tokenize(d.as_ref())).collect();
        token_lists.push(tokenize(query));

        let n = token_lists.len() as f64;
        let mut df: HashMap<&str, usize> = HashMap::new();
        for tokens in &token_lists {
            let mut seen: Vec<&str> = tokens.iter().map(String::as_str).collect();
            seen.sort_unstable();
            seen.dedup();
            for term in seen {
                *df.entry(term).or_insert(0) += 1;
            }
        }
        let idf: HashMap<&str, f64> = df
            .iter()
            .map(|(term, count)| (*term, ((1.0 + n) / (1.0 + *count as f64)).ln() + 1.0))
            .collect();

        let mut vectors: Vec<SparseVector> = token_lists
            .iter()
            .map(|tokens| {
                let mut tf: SparseVector = HashMap::new();
                for term in tokens {
                    *tf.entry(term.clone()).or_insert(0.0) += 1.0;
                }
                for (term, weight) in tf.iter_mut() {
                    *weight *= idf.get(term.as_str()).copied().unwrap_or(1.0);
                }
                normalize(&mut tf);
                tf
            })
            .collect();

        let query = vectors.pop().unwrap_or_default();
        Self {
            documents: vectors,
            query,
        }
    }

    /// Cosine similarity of every document to the query
    pub fn similarities(&self) -> Vec<f64> {
        self.documents
            .iter()
            .map(|doc| {
                doc.iter()
                    .filter_map(|(term, w)| self.query.get(term).map(|q| q * w))
                    .sum()
            })
            .collect()
    }

    /// Indices of the `k` most similar documents, best first
    pub fn top_k(&self, k: usize) -> Vec<usize> {
        let sims = self.similarities();
        let mut order: Vec<usize> = (0..sims.len()).collect();
        order.sort_by(|a, b| {
            sims[*b]
                .partial_cmp(&sims[*a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        order.truncate(k);
        order
    }
}

fn normalize(vector: &mut SparseVector) {
    let norm = vector.values().map(|w| w * w).sum::<f64>().sqrt();
    if norm > 0.0 {
        for w in vector.values_mut() {
            *w /= norm;
        }
    }
}

/// Assert-bearing test functions of a file most similar to the test prefix
///
/// Returns up to `max` dedented functions joined by blank lines, or the
/// dedented prefix itself when the file has no other asserting function.
pub fn assert_style_preview(
    language: Language,
    source: &str,
    test_prefix: &str,
    placeholder: &str,
    max: usize,
) -> Result<String> {
    let lines: Vec<&str> = source.lines().collect();
    let bodies: Vec<String> = function_ranges(language, source)?
        .into_iter()
        .filter(|span| span.kind == SpanKind::Method)
        .map(|span| {
            let end = span.end_line.min(lines.len());
            let start = (span.start_line - 1).min(end);
            lines[start..end].join("\n")
        })
        .filter(|body| body.contains("assert"))
        .collect();

    if bodies.is_empty() {
        return Ok(dedent(test_prefix));
    }

    let ranker = TfIdfRanker::fit(&bodies, &test_prefix.replace(placeholder, ""));
    Ok(ranker
        .top_k(max)
        .into_iter()
        .map(|i| dedent(&bodies[i]))
        .collect::<Vec<_>>()
        .join("\n\n\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenizer_drops_short_tokens() {
        assert_eq!(tokenize("assert x == Foo.bar_baz(1)"), vec!["assert", "foo", "bar_baz"]);
    }

    #[test]
    fn test_most_similar_first() {
        let docs = [
            "def test_parse(): assert parse('a') == 'a'",
            "def test_render(): assert render(page) == html",
            "def test_parse_empty(): assert parse('') is None",
        ];
        let ranker = TfIdfRanker::fit(&docs, "def test_parse_spaces(): result = parse(' a ')");
        let order = ranker.top_k(2);
        assert_eq!(order.len(), 2);
        assert!(!order.contains(&1));
        let sims = ranker.similarities();
        assert!(sims.iter().all(|s| (0.0..=1.0 + 1e-9).contains(s)));
    }

    #[test]
    fn test_identical_document_scores_one() {
        let ranker = TfIdfRanker::fit(&["alpha beta gamma"], "alpha beta gamma");
        assert!((ranker.similarities()[0] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_style_preview_falls_back_to_prefix() {
        let source = "def helper():\n    return 1\n";
        let prefix = "    def test_a(self):\n        ... # <AssertPlaceHolder>";
        let out = assert_style_preview(Language::Python, source, prefix, "... # <AssertPlaceHolder>", 10).unwrap();
        assert_eq!(out, "def test_a(self):\n    ... # <AssertPlaceHolder>");
    }

    #[test]
    fn test_style_preview_picks_asserting_functions() {
        let source = "class TestX:\n    def test_one(self):\n        assert f(1) == 2\n\n    def helper(self):\n        return 3\n\n    def test_two(self):\n        assert g() is None\n";
        let out = assert_style_preview(Language::Python, source, "def test_new(self):\n    y = f(4)", "... # <AssertPlaceHolder>", 10).unwrap();
        let parts: Vec<&str> = out.split("\n\n\n").collect();
        assert_eq!(parts.len(), 2);
        assert!(parts[0].starts_with("def test_one"));
        assert!(!out.contains("helper"));
    }
}
