//! Removal of reasoning traces some models emit before their answer

use std::sync::LazyLock;

use regex::Regex;

static THINK_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<think>.*?</think>").expect("valid regex"));

/// Drop every `<think>…</think>` block (case-insensitive, spans lines) and trim
pub fn strip_reasoning(text: &str) -> String {
    THINK_BLOCK.replace_all(text, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_multiline_block() {
        let text = "<think>\n患者血糖高，\n考虑二甲双胍\n</think>\n[\"二甲双胍\"]\n";
        assert_eq!(strip_reasoning(text), r#"["二甲双胍"]"#);
    }

    #[test]
    fn test_strips_every_block_non_greedy() {
        let text = "<THINK>a</THINK>[\"甲\"<think>b</think>]";
        assert_eq!(strip_reasoning(text), r#"["甲"]"#);
    }

    #[test]
    fn test_unpaired_marker_is_kept() {
        assert_eq!(strip_reasoning("  <think>unfinished "), "<think>unfinished");
        assert_eq!(strip_reasoning("[]"), "[]");
    }
}
