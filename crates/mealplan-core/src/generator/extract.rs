//! Pull a JSON object out of loosely formatted model output.
//!
//! Models asked for "JSON only" still wrap it in markdown fences or add a
//! sentence before or after. Decoding is attempted on the fence-stripped
//! text first, then on the first balanced `{...}` block in it.

use serde_json::{Map, Value};

use super::GeneratorError;

/// Remove a leading ```` ```lang ```` fence and a trailing ```` ``` ````.
pub fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

/// First `{...}` block whose braces balance, ignoring braces inside JSON
/// strings.
pub fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Decode model output into a JSON object.
pub fn extract_object(raw: &str) -> Result<Map<String, Value>, GeneratorError> {
    let clean = strip_fences(raw);
    if clean.is_empty() {
        return Err(GeneratorError::EmptyContent);
    }

    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(clean) {
        return Ok(map);
    }

    if let Some(block) = first_balanced_object(clean) {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(block) {
            return Ok(map);
        }
    }

    Err(GeneratorError::MalformedContent(format!(
        "no JSON object found in: {}",
        preview(clean, 200)
    )))
}

/// At most `max` characters of `text`, with an ellipsis when cut.
pub fn preview(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
