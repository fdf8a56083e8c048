//! Best-effort parsing of a JSON prefix.
//!
//! Tool-call arguments arrive as text fragments. [`parse_partial`] closes the
//! open string and containers of a prefix so the arguments streamed so far can
//! be shown before the call is complete. Keys whose value has not started are
//! dropped; a dangling `:` yields `null`.

use serde_json::Value;

enum Container {
    Object {
        /// Byte offset of a key that has not been followed by `:` yet.
        key_start: Option<usize>,
        expect_key: bool,
    },
    Array,
}

/// Parse `text` as JSON, repairing a truncated tail. Returns `None` when the
/// prefix carries no value yet or cannot be repaired.
pub fn parse_partial(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }
    let repaired = repair(trimmed);
    if repaired.is_empty() {
        return None;
    }
    serde_json::from_str(&repaired).ok()
}

fn repair(text: &str) -> String {
    let mut stack: Vec<Container> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    let mut out = String::with_capacity(text.len() + 8);

    for (offset, ch) in text.char_indices() {
        out.push(ch);
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
            '"' => {
                in_string = true;
                if let Some(Container::Object {
                    key_start,
                    expect_key,
                }) = stack.last_mut()
                {
                    if *expect_key {
                        *key_start = Some(offset);
                        *expect_key = false;
                    }
                }
            }
            '{' => stack.push(Container::Object {
                key_start: None,
                expect_key: true,
            }),
            '[' => stack.push(Container::Array),
            '}' | ']' => {
                stack.pop();
            }
            ':' => {
                if let Some(Container::Object { key_start, .. }) = stack.last_mut() {
                    *key_start = None;
                }
            }
            ',' => {
                if let Some(Container::Object { expect_key, .. }) = stack.last_mut() {
                    *expect_key = true;
                }
            }
            _ => {}
        }
    }

    let pending_key = match stack.last() {
        Some(Container::Object {
            key_start: Some(start),
            ..
        }) => Some(*start),
        _ => None,
    };

    if let Some(start) = pending_key {
        out.truncate(start);
    } else if in_string {
        if escaped {
            out.pop();
        }
        drop_partial_unicode_escape(&mut out);
        out.push('"');
    }

    close_tail(&mut out);

    for container in stack.iter().rev() {
        out.push(match container {
            Container::Object { .. } => '}',
            Container::Array => ']',
        });
    }
    out
}

/// `"\u00` cannot be closed as is; cut the incomplete escape.
fn drop_partial_unicode_escape(out: &mut String) {
    let tail_start = out.len().saturating_sub(6);
    let Some(tail) = out.get(tail_start..) else {
        return;
    };
    if let Some(pos) = tail.rfind("\\u") {
        let digits = &tail[pos + 2..];
        if digits.len() < 4 && digits.chars().all(|c| c.is_ascii_hexdigit()) {
            out.truncate(tail_start + pos);
        }
    }
}

/// Repair whatever is left after the last complete token.
fn close_tail(out: &mut String) {
    loop {
        let trimmed_len = out.trim_end().len();
        out.truncate(trimmed_len);
        let Some(last) = out.chars().last() else {
            return;
        };
        match last {
            ',' => {
                out.pop();
            }
            ':' => {
                out.push_str("null");
                return;
            }
            c if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+') => {
                let token_start = out
                    .rfind(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+')))
                    .map(|idx| idx + 1)
                    .unwrap_or(0);
                let token = out[token_start..].to_string();
                if serde_json::from_str::<Value>(&token).is_ok() {
                    return;
                }
                out.truncate(token_start);
                if let Some(literal) = ["true", "false", "null"]
                    .into_iter()
                    .find(|literal| literal.starts_with(token.as_str()))
                {
                    out.push_str(literal);
                    return;
                }
                let number = token.trim_end_matches(['.', 'e', 'E', '+', '-']);
                if !number.is_empty() && serde_json::from_str::<Value>(number).is_ok() {
                    out.push_str(number);
                    return;
                }
                // Nothing salvageable; re-check what precedes the token.
            }
            _ => return,
        }
    }
}
