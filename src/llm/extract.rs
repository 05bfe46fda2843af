//! JSON recovery from noisy model output

use crate::constants::MALFORMED_OUTPUT_PREVIEW_CHARS;
use crate::utils::truncate_chars;
use crate::{FlowsmithError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static OBJECT_SPAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{.*\}").expect("object span regex is valid"));

static ARRAY_SPAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\[.*\]").expect("array span regex is valid"));

/// Extract a JSON value from a model completion
///
/// Order of attempts:
/// 1. strip a leading ```` ```json ```` / ```` ``` ```` fence and a trailing ```` ``` ````
/// 2. parse the whole text
/// 3. the greedy outermost `{...}` span, then the greedy `[...]` span
/// 4. every balanced brace/bracket block, largest first
pub fn extract_json(text: &str) -> Result<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(FlowsmithError::malformed_output("empty response"));
    }

    let unfenced = strip_fences(trimmed);

    if let Ok(value) = serde_json::from_str::<Value>(unfenced) {
        return Ok(value);
    }

    let greedy = [&*OBJECT_SPAN, &*ARRAY_SPAN]
        .into_iter()
        .filter_map(|re| re.find(unfenced).map(|m| m.as_str()));

    for candidate in greedy {
        if let Ok(value) = serde_json::from_str::<Value>(candidate) {
            return Ok(value);
        }
    }

    let mut blocks = balanced_blocks(unfenced);
    blocks.sort_by_key(|block| std::cmp::Reverse(block.len()));
    for block in blocks {
        if let Ok(value) = serde_json::from_str::<Value>(block) {
            return Ok(value);
        }
    }

    Err(FlowsmithError::malformed_output(format!(
        "could not extract JSON: {}",
        truncate_chars(unfenced, MALFORMED_OUTPUT_PREVIEW_CHARS)
    )))
}

fn strip_fences(text: &str) -> &str {
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    let text = text.strip_suffix("```").unwrap_or(text);
    text.trim()
}

/// Every `{...}` / `[...]` block whose delimiters balance, ignoring
/// delimiters inside string literals. Nested blocks are reported too.
fn balanced_blocks(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut blocks = Vec::new();

    for (start, &open) in bytes.iter().enumerate() {
        let close = match open {
            b'{' => b'}',
            b'[' => b']',
            _ => continue,
        };

        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;

        for (offset, &byte) in bytes[start..].iter().enumerate() {
            if in_string {
                match byte {
                    _ if escaped => escaped = false,
                    b'\\' => escaped = true,
                    b'"' => in_string = false,
                    _ => {}
                }
                continue;
            }
            match byte {
                b'"' => in_string = true,
                b if b == open => depth += 1,
                b if b == close => {
                    depth -= 1;
                    if depth == 0 {
                        blocks.push(&text[start..=start + offset]);
                        break;
                    }
                }
                _ => {}
            }
        }
    }

    blocks
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_json() {
        assert_eq!(extract_json(r#"{"a": 1}"#).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_fenced_json() {
        let text = "```json\n{\"nodes\": []}\n```";
        assert_eq!(extract_json(text).unwrap(), json!({"nodes": []}));

        let text = "```\n[1, 2]\n```";
        assert_eq!(extract_json(text).unwrap(), json!([1, 2]));
    }

    #[test]
    fn test_json_surrounded_by_prose() {
        let text = "Here is the flow you asked for: {\"name\": \"x\"} hope it helps";
        assert_eq!(extract_json(text).unwrap(), json!({"name": "x"}));
    }

    #[test]
    fn test_balanced_scan_when_greedy_span_fails() {
        // Greedy span covers both objects plus the prose between them
        let text = "first {\"a\": 1} then {\"b\": {\"c\": \"}\"}} end";
        assert_eq!(extract_json(text).unwrap(), json!({"b": {"c": "}"}}));
    }

    #[test]
    fn test_truncated_output_recovers_inner_block() {
        let text = "{\"intent\": {\"objective\": \"rates\"}, \"flow\": {\"nodes\": [";
        assert_eq!(extract_json(text).unwrap(), json!({"objective": "rates"}));
    }

    #[test]
    fn test_empty_and_garbage() {
        let err = extract_json("   ").unwrap_err();
        assert!(matches!(err, FlowsmithError::MalformedOutput(ref m) if m == "empty response"));

        let err = extract_json("no json here").unwrap_err();
        assert!(err.to_string().contains("could not extract JSON: no json here"));
    }
}
