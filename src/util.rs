//! Shared utility functions for the kubelab crate.

/// Locate the first complete JSON object or array in `text`.
///
/// Provider CLIs mix warnings into their output; this finds the outermost
/// document by bracket counting, ignoring brackets inside string literals.
pub fn extract_json(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_object_simple() {
        let text = r#"{"cluster": {"status": "ACTIVE"}}"#;
        assert_eq!(extract_json(text), Some(text));
    }

    #[test]
    fn test_extract_json_with_warning_prefix() {
        let text = "WARNING: The behavior of this command may change.\n[{\"name\": \"default-pool\"}]\n";
        assert_eq!(extract_json(text), Some(r#"[{"name": "default-pool"}]"#));
    }

    #[test]
    fn test_extract_json_ignores_brackets_in_strings() {
        let text = r#"{"message": "see [docs] {here}", "ok": true} trailing"#;
        assert_eq!(
            extract_json(text),
            Some(r#"{"message": "see [docs] {here}", "ok": true}"#)
        );
    }

    #[test]
    fn test_extract_json_no_json() {
        assert_eq!(extract_json("No JSON here"), None);
    }

    #[test]
    fn test_extract_json_unclosed() {
        assert_eq!(extract_json(r#"{"key": "value""#), None);
    }
}
