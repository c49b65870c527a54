use once_cell::sync::Lazy;
use regex::Regex;

// Non-greedy, dot matches newline. Each block ends at the first closing tag.
static THINK_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("reasoning trace pattern"));

/// Remove `<think>…</think>` spans that small local models emit before the
/// answer. Best-effort text cleanup, applied in a single pass; an unclosed
/// opening tag is left in place.
pub fn strip_reasoning_trace(text: &str) -> String {
    THINK_BLOCK.replace_all(text, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::strip_reasoning_trace;

    #[test]
    fn removes_single_block() {
        assert_eq!(strip_reasoning_trace("<think>internal</think>Hello"), "Hello");
    }

    #[test]
    fn leaves_text_without_tags_untouched() {
        assert_eq!(strip_reasoning_trace("plain answer"), "plain answer");
    }

    #[test]
    fn spans_newlines() {
        let text = "<think>\nline one\nline two\n</think>\n{\"a\":1}";
        assert_eq!(strip_reasoning_trace(text), "\n{\"a\":1}");
    }

    #[test]
    fn removes_every_block_in_one_pass() {
        let text = "<think>a</think>first <think>b</think>second";
        assert_eq!(strip_reasoning_trace(text), "first second");
    }

    #[test]
    fn nested_tags_stop_at_first_close() {
        let text = "<think>a<think>b</think>c</think>answer";
        assert_eq!(strip_reasoning_trace(text), "c</think>answer");
    }

    #[test]
    fn unclosed_tag_is_kept() {
        assert_eq!(
            strip_reasoning_trace("<think>never closed"),
            "<think>never closed"
        );
    }
}
