//! Response cleanup: turn raw model text into something parseable.
//!
//! Models are asked for "a single JSON object and nothing else" and mostly
//! comply, but routinely wrap it in ```` ```json ```` fences or prepend a
//! sentence. These rules recover the object without guessing at content:
//!
//! 1. Strip one outer Markdown fence (with or without a language tag).
//! 2. Parse the remainder as a JSON object.
//! 3. Failing that, parse the span between the first `{` and the last `}`.
//!
//! Anything else is a [`LlmStageError::MalformedJson`].

use crate::error::LlmStageError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*[ \t]*\r?\n(.*?)\r?\n?```\s*$").unwrap());

/// Longest prefix of a bad response quoted in errors and logs.
const SNIPPET_CHARS: usize = 120;

/// Remove one outer code fence, if the whole text is fenced.
pub fn strip_code_fences(input: &str) -> String {
    let trimmed = input.trim();
    match RE_OUTER_FENCES.captures(trimmed) {
        Some(caps) => caps[1].trim().to_string(),
        None => trimmed.to_string(),
    }
}

/// Parse a model response into a JSON object.
pub fn parse_json_object(response: &str) -> Result<Map<String, Value>, LlmStageError> {
    let cleaned = strip_code_fences(response);

    let first_err = match serde_json::from_str::<Value>(&cleaned) {
        Ok(Value::Object(map)) => return Ok(map),
        Ok(other) => format!("expected a JSON object, got {}", kind_of(&other)),
        Err(e) => e.to_string(),
    };

    if let (Some(start), Some(end)) = (cleaned.find('{'), cleaned.rfind('}')) {
        if start < end {
            if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&cleaned[start..=end]) {
                return Ok(map);
            }
        }
    }

    Err(LlmStageError::MalformedJson {
        detail: first_err,
        snippet: cleaned.chars().take(SNIPPET_CHARS).collect(),
    })
}

/// Trim surrounding whitespace from every key of a model-produced object.
///
/// Two keys that only differ by whitespace are an [`LlmStageError::InvalidValue`].
pub fn trim_keys(obj: Map<String, Value>) -> Result<Map<String, Value>, LlmStageError> {
    let mut out = Map::with_capacity(obj.len());
    for (key, value) in obj {
        let trimmed = key.trim();
        if out.contains_key(trimmed) {
            return Err(LlmStageError::InvalidValue {
                key: trimmed.to_string(),
                detail: "key appears more than once after trimming whitespace".into(),
            });
        }
        out.insert(trimmed.to_string(), value);
    }
    Ok(out)
}

fn kind_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
