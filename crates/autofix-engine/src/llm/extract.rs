//! Pull the program text out of a chat reply.

use crate::surface;
use regex::Regex;
use std::sync::OnceLock;

fn fence_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```[ \t]*([A-Za-z0-9_+-]*)[^\n]*\n(.*?)```").ok())
        .as_ref()
}

fn is_python_tag(tag: &str) -> bool {
    matches!(
        tag.to_ascii_lowercase().as_str(),
        "python" | "py" | "python3"
    )
}

/// Last fenced python block, else last fenced block, else the whole reply,
/// with commentary and chat tokens removed. `None` when nothing is left.
pub fn extract_code(reply: &str) -> Option<String> {
    let reply = reply.replace("\r\n", "\n");
    let blocks: Vec<(String, String)> = fence_re()
        .map(|re| {
            re.captures_iter(&reply)
                .map(|c| {
                    let tag = c.get(1).map(|m| m.as_str()).unwrap_or("").to_string();
                    let body = c.get(2).map(|m| m.as_str()).unwrap_or("").to_string();
                    (tag, body)
                })
                .collect()
        })
        .unwrap_or_default();

    let chosen = blocks
        .iter()
        .rev()
        .find(|(tag, body)| is_python_tag(tag) && !body.trim().is_empty())
        .or_else(|| blocks.iter().rev().find(|(_, body)| !body.trim().is_empty()))
        .map(|(_, body)| body.as_str())
        .unwrap_or(reply.as_str());

    let code = surface::strip_commentary(chosen);
    if code.trim().is_empty() {
        None
    } else {
        Some(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_last_python_block() {
        let reply = "Original:\n```python\nx = 1\n```\nFixed:\n```text\nnot code\n```\n```py\nx = 2\n```\nDone.";
        assert_eq!(extract_code(reply).as_deref(), Some("x = 2\n"));
    }

    #[test]
    fn falls_back_to_any_block_then_raw() {
        assert_eq!(
            extract_code("```\nprint('hi')\n```").as_deref(),
            Some("print('hi')\n")
        );
        assert_eq!(
            extract_code("Here is the corrected program:\nprint('hi')").as_deref(),
            Some("print('hi')")
        );
    }

    #[test]
    fn unterminated_fence_is_stripped() {
        assert_eq!(
            extract_code("```python\ndef f():\n    return 1\n").as_deref(),
            Some("def f():\n    return 1\n")
        );
    }

    #[test]
    fn empty_reply_is_none() {
        assert_eq!(extract_code("<|im_start|>assistant\n```python\n```\n<|im_end|>"), None);
        assert_eq!(extract_code("   "), None);
    }
}
