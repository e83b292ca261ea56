//! Dotted-path navigation over JSON values (`a.b.0.c`).
//!
//! Numeric segments index into sequences; everything else indexes into
//! mappings. There is no JSONPath syntax here — no `$.` prefix, no `[0]`
//! bracket form, no wildcards — just plain dot-separated segments, matching
//! the reference-expression grammar used by `input_mapping` and
//! `response_extract`.

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("path '{path}' could not be resolved at segment '{segment}'")]
pub struct PathError {
    pub path: String,
    pub segment: String,
}

/// Splits `"a.b.0.c"` into `["a", "b", "0", "c"]`. An empty path yields no
/// segments, meaning "the whole value".
fn split_path(path: &str) -> Vec<&str> {
    if path.is_empty() {
        Vec::new()
    } else {
        path.split('.').collect()
    }
}

/// Navigates `value` along `path`, indexing sequences by numeric segment
/// and mappings by key. Returns `PathError` naming the full path and the
/// first segment that could not be followed.
pub fn traverse<'a>(value: &'a Value, path: &str) -> Result<&'a Value, PathError> {
    let mut current = value;
    for segment in split_path(path) {
        current = match current {
            Value::Object(map) => map.get(segment).ok_or_else(|| PathError {
                path: path.to_string(),
                segment: segment.to_string(),
            })?,
            Value::Array(items) => {
                let index: usize = segment.parse().map_err(|_| PathError {
                    path: path.to_string(),
                    segment: segment.to_string(),
                })?;
                items.get(index).ok_or_else(|| PathError {
                    path: path.to_string(),
                    segment: segment.to_string(),
                })?
            }
            _ => {
                return Err(PathError {
                    path: path.to_string(),
                    segment: segment.to_string(),
                })
            }
        };
    }
    Ok(current)
}

/// Convenience wrapper that clones the resolved value.
pub fn traverse_owned(value: &Value, path: &str) -> Result<Value, PathError> {
    traverse(value, path).map(|v| v.clone())
}
