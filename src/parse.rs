//! Helpers for digging structured data out of free-text model responses.
//!
//! Both backends are asked for strict JSON but routinely wrap it in prose or
//! markdown fences, so every decode goes through these extractors first.

use regex::Regex;
use std::sync::OnceLock;

/// Extract the first balanced `{...}` object from free text.
///
/// Brace matching is string-aware so braces inside JSON strings do not
/// confuse the depth count. Markdown fences need no special handling since
/// the scan starts at the first `{`.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    None
}

/// All unsigned integer tokens in the text, in order of appearance.
///
/// Grounding models answer in assorted formats ("(812, 454)",
/// "x=812 y=454", "<point>812 454</point>"); taking the numeric tokens in
/// order covers all of them.
pub fn numeric_tokens(text: &str) -> Vec<i64> {
    static DIGITS: OnceLock<Regex> = OnceLock::new();
    let re = DIGITS.get_or_init(|| Regex::new(r"\d+").expect("valid regex"));
    re.find_iter(text)
        .filter_map(|m| m.as_str().parse().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_plain_object() {
        let text = r#"{"action": "wait", "params": {}}"#;
        assert_eq!(extract_json_object(text), Some(text));
    }

    #[test]
    fn test_extract_skips_leading_prose() {
        let text = r#"Sure, here is the action: {"action": "click", "params": {"x": 1}} Hope that helps!"#;
        assert_eq!(
            extract_json_object(text),
            Some(r#"{"action": "click", "params": {"x": 1}}"#)
        );
    }

    #[test]
    fn test_extract_handles_fenced_block() {
        let text = "```json\n{\"on_target\": true, \"x\": null, \"y\": null}\n```";
        let json = extract_json_object(text).unwrap();
        let value: serde_json::Value = serde_json::from_str(json).unwrap();
        assert_eq!(value["on_target"], true);
    }

    #[test]
    fn test_extract_ignores_braces_in_strings() {
        let text = r#"{"reasoning": "the \"{weird}\" icon", "x": 4}"#;
        let json = extract_json_object(text).unwrap();
        let value: serde_json::Value = serde_json::from_str(json).unwrap();
        assert_eq!(value["x"], 4);
    }

    #[test]
    fn test_extract_none_without_object() {
        assert_eq!(extract_json_object("no json here"), None);
        assert_eq!(extract_json_object("{unterminated"), None);
    }

    #[test]
    fn test_numeric_tokens_formats() {
        assert_eq!(numeric_tokens("(812, 454)"), vec![812, 454]);
        assert_eq!(numeric_tokens("x=100 y=250"), vec![100, 250]);
        assert_eq!(numeric_tokens("no numbers"), Vec::<i64>::new());
    }
}
