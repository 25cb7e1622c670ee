//! Static checks on a candidate assertion
//!
//! Two checks, in order:
//! - the statement must parse on its own
//! - it must not repeat the nearest assertion directly above or below the
//!   placeholder (blank lines are skipped, any other statement stops the scan)

use crate::syntax::is_valid_statement;
use crate::types::task::strip_assert_qualifier;
use crate::types::{CheckOutcome, CodeFragment, Language};

pub const SYNTAX_ERROR: &str =
    "Static check failed. The generated assert statement has a syntax error.";
pub const PASSED: &str = "The generated assert statement passes the static check.";

/// Run both static checks for `assert_code`
pub fn check_assert(
    language: Language,
    assert_code: &str,
    test_prefix: &CodeFragment,
    placeholder: &str,
) -> CheckOutcome {
    if !is_valid_statement(language, assert_code) {
        return CheckOutcome::new(false, SYNTAX_ERROR);
    }

    match duplicate_line(language, assert_code, test_prefix, placeholder) {
        Some(line) => CheckOutcome::new(
            false,
            format!(
                "Static check failed. The generated assert statement is a duplicate check with the assert statement on line {}.",
                line
            ),
        ),
        None => CheckOutcome::new(true, PASSED),
    }
}

fn comparable(language: Language, code: &str) -> String {
    match language {
        Language::Java => strip_assert_qualifier(code.trim()),
        Language::Python => code.trim().to_string(),
    }
}

/// Absolute line of an adjacent assertion equal to `assert_code`
fn duplicate_line(
    language: Language,
    assert_code: &str,
    test_prefix: &CodeFragment,
    placeholder: &str,
) -> Option<usize> {
    let lines: Vec<&str> = test_prefix.text.lines().collect();
    let ph = lines.iter().position(|l| l.trim() == placeholder)?;
    let candidate = comparable(language, assert_code);

    let neighbour = |indices: &mut dyn Iterator<Item = usize>| -> Option<usize> {
        for i in indices {
            let line = lines[i].trim();
            if line.is_empty() {
                continue;
            }
            if language.assert_prefixes().iter().any(|p| line.starts_with(p)) {
                return Some(i);
            }
            return None;
        }
        None
    };

    let above = neighbour(&mut (0..ph).rev());
    let below = neighbour(&mut (ph + 1..lines.len()));

    [above, below]
        .into_iter()
        .flatten()
        .find(|&i| comparable(language, lines[i]) == candidate)
        .map(|i| test_prefix.start_line + i)
}
