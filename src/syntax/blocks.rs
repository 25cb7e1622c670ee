//! Markdown fenced block extraction

use regex::Regex;
use std::sync::OnceLock;

fn fence_pattern() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"```[ \t]*(?:[\w+-]+)?[ \t]*\r?\n([\s\S]*?)```").expect("valid regex")
    })
}

/// Bodies of all fenced code blocks, in order
pub fn extract_blocks(content: &str) -> Vec<&str> {
    fence_pattern()
        .captures_iter(content)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect()
}

/// Body of the last fenced block, or an empty string
pub fn extract_last_block(content: &str) -> &str {
    extract_blocks(content).pop().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_json_block_wins() {
        let reply = "Draft:\n```java\nassertTrue(x);\n```\nFinal:\n```json\n{\"assert_code\": \"assertEquals(1, x);\"}\n```\n";
        assert_eq!(extract_blocks(reply).len(), 2);
        assert_eq!(extract_last_block(reply), "{\"assert_code\": \"assertEquals(1, x);\"}\n");
    }

    #[test]
    fn test_no_block() {
        assert_eq!(extract_last_block("{\"assert_code\": \"assert x\"}"), "");
    }

    #[test]
    fn test_untagged_fence_with_crlf() {
        assert_eq!(extract_last_block("```\r\nbody\n```"), "body\n");
    }
}
