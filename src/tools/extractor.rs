//! Pulls an embedded tool call out of a model turn.
//!
//! Grammar: the turn is free text containing exactly one top-level JSON
//! object of the form
//!
//! ```text
//! {"tool": "<name>", "parameters": {"<param>": <string|number|boolean>, ...}}
//! ```
//!
//! Any deviation (no candidate, several candidates, a truncated candidate,
//! extra keys, nested values) means no call was made.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::schema::ArgValue;
use super::validator::ToolCall;

const TOOL_KEY: &str = "tool";
const PARAMETERS_KEY: &str = "parameters";

/// How a brace-delimited span starting at a `{` ends
enum SpanEnd {
    /// Byte length of the balanced span
    Closed(usize),
    /// Text ran out first; `tool_key` is set when `"tool"` appeared directly
    /// inside the outermost object
    Open { tool_key: bool },
}

/// Find the single embedded call in `text`, if there is exactly one.
pub fn extract(text: &str) -> Option<ToolCall> {
    let mut candidates = Vec::new();
    let mut pos = 0;

    while let Some(offset) = text[pos..].find('{') {
        let start = pos + offset;
        match scan_span(&text[start..]) {
            SpanEnd::Closed(len) => match serde_json::from_str::<Value>(&text[start..start + len]) {
                Ok(Value::Object(map)) => {
                    if map.contains_key(TOOL_KEY) {
                        candidates.push(map);
                    }
                    pos = start + len;
                }
                // Braces in prose; objects may still sit inside
                _ => pos = start + 1,
            },
            // A cut-off call at the end of the turn must not let an earlier one through
            SpanEnd::Open { tool_key: true } => return None,
            SpanEnd::Open { tool_key: false } => pos = start + 1,
        }
    }

    let candidate = candidates.pop()?;
    if !candidates.is_empty() {
        return None;
    }

    parse_call(candidate)
}

fn parse_call(mut object: Map<String, Value>) -> Option<ToolCall> {
    if object.len() != 2 {
        return None;
    }

    let operation = match object.remove(TOOL_KEY)? {
        Value::String(name) if !name.trim().is_empty() => name.trim().to_string(),
        _ => return None,
    };

    let parameters = match object.remove(PARAMETERS_KEY)? {
        Value::Object(params) => params,
        _ => return None,
    };

    let mut arguments = BTreeMap::new();
    for (name, value) in parameters {
        arguments.insert(name, to_arg_value(value)?);
    }

    Some(ToolCall {
        operation,
        arguments,
    })
}

fn to_arg_value(value: Value) -> Option<ArgValue> {
    match value {
        Value::String(s) => Some(ArgValue::Text(s)),
        Value::Bool(b) => Some(ArgValue::Bool(b)),
        Value::Number(n) => n
            .as_i64()
            .map(ArgValue::Integer)
            .or_else(|| n.as_f64().map(ArgValue::Float)),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Scan one span; `text` starts at its opening brace.
///
/// Quotes only count inside a span; prose apostrophes and quotes outside
/// objects never open a string.
fn scan_span(text: &str) -> SpanEnd {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut string_start = 0usize;
    let mut tool_key = false;

    for (idx, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => {
                    in_string = false;
                    if depth == 1 && &text[string_start..idx] == TOOL_KEY {
                        tool_key = true;
                    }
                }
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => {
                in_string = true;
                string_start = idx + 1;
            }
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return SpanEnd::Closed(idx + 1);
                }
            }
            _ => {}
        }
    }

    SpanEnd::Open { tool_key }
}
