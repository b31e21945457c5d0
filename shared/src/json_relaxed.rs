//! Recovers the JSON object from a chat model's extraction answer.
//!
//! Models wrap the object in Markdown fences, prefix it with prose or append
//! explanations. Only an object is a usable answer; arrays and scalars are
//! rejected.

use serde_json::{Map, Value};

use crate::error::{AppError, Result};

/// Returns the first JSON object found in `answer`.
pub fn answer_object(answer: &str) -> Result<Map<String, Value>> {
    let body = strip_code_fences(answer);
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(obj)) => return Ok(obj),
        Ok(_) => return Err(not_an_object()),
        Err(_) => {}
    }
    for (start, _) in body.match_indices('{') {
        let Some(end) = closing_brace(&body[start..]) else {
            continue;
        };
        if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(&body[start..=start + end]) {
            return Ok(obj);
        }
    }
    Err(not_an_object())
}

fn not_an_object() -> AppError {
    AppError::ExtractionUnavailable("model answer contains no JSON object".into())
}

/// Drops a surrounding ```` ``` ```` fence, including an info string such as `json`.
pub fn strip_code_fences(s: &str) -> &str {
    let s = s.trim();
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    let rest = match rest.find('\n') {
        Some(nl) if !rest[..nl].contains('{') => &rest[nl + 1..],
        _ => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

/// Byte offset of the brace closing the object that opens at `s[0]`,
/// ignoring braces inside string literals.
fn closing_brace(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_str = false;
    let mut esc = false;
    for (i, ch) in s.char_indices() {
        if in_str {
            match ch {
                _ if esc => esc = false,
                '\\' => esc = true,
                '"' => in_str = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_str = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}
