//! Type-preserving `{{key}}` template rendering.
//!
//! A value that is *exactly* `"{{key}}"` (nothing else in the string)
//! renders to the looked-up value with its original JSON type intact — a
//! number stays a number, an object stays an object. A placeholder embedded
//! in a larger string (`"Bearer {{token}}"`) always stringifies the looked
//! up value and splices it into the surrounding text. Missing keys are an
//! error in strict mode; in non-strict mode the placeholder is left
//! untouched in the output.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{([A-Za-z0-9_.]+)\}\}").expect("valid placeholder regex"));

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("template key '{0}' is not defined")]
pub struct TemplateKeyError(pub String);

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Renders a single string, honoring the exact-match/embedded split.
fn render_str(
    input: &str,
    values: &HashMap<String, Value>,
    strict: bool,
) -> Result<Value, TemplateKeyError> {
    if let Some(caps) = PLACEHOLDER_RE.captures(input) {
        let whole = caps.get(0).unwrap();
        if whole.start() == 0 && whole.end() == input.len() {
            let key = caps.get(1).unwrap().as_str();
            return match values.get(key) {
                Some(v) => Ok(v.clone()),
                None if strict => Err(TemplateKeyError(key.to_string())),
                None => Ok(Value::String(input.to_string())),
            };
        }
    }

    let mut out = String::new();
    let mut last = 0;
    for caps in PLACEHOLDER_RE.captures_iter(input) {
        let whole = caps.get(0).unwrap();
        let key = caps.get(1).unwrap().as_str();
        out.push_str(&input[last..whole.start()]);
        match values.get(key) {
            Some(v) => out.push_str(&stringify(v)),
            None if strict => return Err(TemplateKeyError(key.to_string())),
            None => out.push_str(whole.as_str()),
        }
        last = whole.end();
    }
    out.push_str(&input[last..]);
    Ok(Value::String(out))
}

/// Recursively renders placeholders inside a JSON value, preserving the
/// shape of arrays/objects and the type of exact-match string placeholders.
pub fn render_value(
    value: &Value,
    values: &HashMap<String, Value>,
    strict: bool,
) -> Result<Value, TemplateKeyError> {
    match value {
        Value::String(s) => render_str(s, values, strict),
        Value::Array(items) => {
            let mut rendered = Vec::with_capacity(items.len());
            for item in items {
                rendered.push(render_value(item, values, strict)?);
            }
            Ok(Value::Array(rendered))
        }
        Value::Object(map) => {
            let mut rendered = Map::with_capacity(map.len());
            for (k, v) in map {
                rendered.insert(k.clone(), render_value(v, values, strict)?);
            }
            Ok(Value::Object(rendered))
        }
        other => Ok(other.clone()),
    }
}
