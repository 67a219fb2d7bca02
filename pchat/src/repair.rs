//! Best-effort recovery of malformed model-emitted JSON.
//!
//! ```rust
//! use pchat::repair_json;
//!
//! let value = repair_json("{\"city\": \"Par").expect("repairable");
//! assert_eq!(value["city"], "Par");
//! ```

use serde_json::{Map, Value};

/// Parses a possibly fenced, truncated, or trailing-garbage JSON
/// string, returning the first complete value it can salvage. `None`
/// means the input was beyond repair.
pub fn repair_json(raw: &str) -> Option<Value> {
    let cleaned = strip_fences(raw);
    if cleaned.is_empty() {
        return Some(Value::Object(Map::new()));
    }

    if let Ok(value) = serde_json::from_str(cleaned) {
        return Some(value);
    }

    balance(cleaned)
}

/// Parses a tool-call argument payload. An empty payload is an empty
/// object. In strict mode malformed JSON is rejected; otherwise the
/// repair pass runs, and the original parse error is kept when even
/// that fails.
pub fn parse_arguments(raw: &str, strict: bool) -> Result<Value, serde_json::Error> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }

    match serde_json::from_str(raw) {
        Ok(value) => Ok(value),
        Err(err) if !strict => repair_json(raw).ok_or(err),
        Err(err) => Err(err),
    }
}

fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

fn balance(raw: &str) -> Option<Value> {
    let start = raw.find(['{', '['])?;
    let slice = &raw[start..];

    let mut closers: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (position, ch) in slice.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }

        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => closers.push('}'),
            '[' if !in_string => closers.push(']'),
            '}' | ']' if !in_string => {
                closers.pop();
                if closers.is_empty() {
                    // First complete value wins; trailing bytes are
                    // ignored.
                    let end = position + ch.len_utf8();
                    return serde_json::from_str(&slice[..end]).ok();
                }
            }
            _ => {}
        }
    }

    let mut candidate = slice.to_string();
    if in_string {
        candidate.push('"');
    }

    let closer_suffix: String = closers.iter().rev().collect();
    let without_comma = candidate.trim_end().trim_end_matches(',').to_string();
    let attempts = [
        format!("{candidate}{closer_suffix}"),
        format!("{without_comma}{closer_suffix}"),
        format!("{candidate}: null{closer_suffix}"),
        format!("{candidate} null{closer_suffix}"),
    ];

    attempts
        .iter()
        .find_map(|attempt| serde_json::from_str(attempt).ok())
}
