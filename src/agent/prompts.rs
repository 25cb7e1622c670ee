//! Prompt text shared by the writer and the reviewer

use crate::types::{ExploreNotes, Language, TaskContext};

pub const EXPLORE_NOTICE: &str = "\nYou will also be provided with the callees of method under test and unit test, along with the advice on the style of assert statement writing.\n";

pub const DEBUG_TOOL_NOTICE: &str = "\nYou can use the `get_debug_value` tool to query the values of variables or expressions in the test function. Do not repeat the query and call this tool up to 5 times at most.";

/// Shown as the test run result when verification never reached the runner
pub const STATIC_FAILED_RUN: &str = "Static check failed, did not start running.";

/// Which side of the review loop a prompt is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Writer,
    Reviewer,
}

/// Task description, placeholder position and requirement list
pub fn task_intro(ctx: &TaskContext, audience: Audience) -> String {
    let mut prompt = format!(
        "You will be provided with the file path and function body of a method under test, a test setup, and the corresponding unit test.\n\
         The other parts of the unit test have already been written, but there is still one assert statement that has not been completed, which is located in the `{}` position.\n",
        ctx.placeholder
    );
    if audience == Audience::Reviewer {
        prompt.push_str(
            "\nA programmer is trying to write this assert statement.\n\
             Your task is to determine if the programmer's answer is correct and provide suggestions.\n",
        );
    }
    prompt.push_str("This assert statement should meet the following requirements:\n");

    let mut requirements = vec!["Test the method under test."];
    requirements.push(match ctx.language {
        Language::Java => "Be a single line of `org.junit.Assert` statement.",
        Language::Python => "Be a single line of Python assert statement.",
    });
    if audience == Audience::Reviewer {
        requirements.push("Passed static check and test run check.");
    }
    requirements.push("Maintain consistent writing habits and styles with other assert statements.");
    if ctx.language == Language::Java {
        requirements.push("Cannot introduce any additional dependencies that are not currently introduced.");
    }
    for (i, requirement) in requirements.iter().enumerate() {
        prompt.push_str(&format!("{}. {}\n", i + 1, requirement));
    }
    prompt
}

/// Method under test, setup and test prefix, with explorer notes and locals
/// placed around them when available
pub fn context_sections(ctx: &TaskContext, notes: Option<&ExploreNotes>, locals: Option<&str>) -> String {
    let mut prompt = String::new();

    if let Some(notes) = notes.filter(|n| !n.explore_focal_method.is_empty()) {
        prompt.push_str(&format!(
            "\n\n\n# Code Context Related to Method Under Test\n\n{}\n",
            notes.explore_focal_method
        ));
    }
    prompt.push_str(&format!("\n# Method Under Test\n...\n{}\n...\n", ctx.focal_method.numbered()));
    prompt.push_str(&format!("\n\n# Test Setup\n...\n{}\n...\n", ctx.numbered_setup()));

    if let Some(notes) = notes.filter(|n| !n.explore_test_prefix.is_empty()) {
        prompt.push_str(&format!(
            "\n\n# Code Context Related to Unit Test\n\n{}\n",
            notes.explore_test_prefix
        ));
    }
    prompt.push_str(&format!("\n# Unit Test\n...\n{}\n...\n", ctx.test_prefix.numbered()));

    if let Some(notes) = notes {
        let scope = match ctx.language {
            Language::Java => "Class",
            Language::Python => "File",
        };
        prompt.push_str(&format!(
            "\n\n# Conclusion of Assert Statement Style in the Current Test {}\n\n{}\n",
            scope, notes.explore_assert_style
        ));
    }
    if let Some(locals) = locals {
        prompt.push_str(&format!("\n\n# Local Variable Information\n{}\n", locals));
    }
    prompt
}

/// Ask for the answer again in a fenced JSON block with the given fields
pub fn json_retry_prompt(fields: &str) -> String {
    format!(
        "Okay, please write the final result now in a markdown JSON block, for example:\n```json\n{{\n{}\n}}\n```\n",
        fields
    )
}

/// Parse the last fenced block of a reply as JSON, or the whole reply when
/// it has none
pub fn parse_json_reply(reply: &str) -> Option<serde_json::Value> {
    let block = crate::syntax::extract_last_block(reply);
    let payload = if block.trim().is_empty() { reply } else { block };
    serde_json::from_str(payload.trim()).ok()
}
