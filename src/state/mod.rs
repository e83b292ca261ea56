//! Per-run state: the caller's inputs plus each step's recorded output.
//!
//! A step's `input_mapping` entries are reference expressions, resolved here
//! against this state: a literal JSON value, `"$input.<path>"` navigating
//! the run's `user_inputs`, or `"<step_id>.<path>"` navigating a previously
//! recorded step's output. Anything else is a literal.

use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

use crate::path::{self, PathError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateResolutionError {
    #[error("input '{0}' could not be resolved: {1}")]
    Input(String, PathError),

    #[error("reference to step '{0}' could not be resolved: {1}")]
    Step(String, PathError),
}

const INPUT_PREFIX: &str = "$input.";

/// Splits `"step_id.rest.of.path"` into `("step_id", "rest.of.path")`.
fn split_reference(s: &str) -> Option<(&str, &str)> {
    let dot = s.find('.')?;
    Some((&s[..dot], &s[dot + 1..]))
}

pub struct StateManager {
    user_inputs: Value,
    step_outputs: HashMap<String, Value>,
}

impl StateManager {
    pub fn new(user_inputs: HashMap<String, Value>) -> Self {
        Self {
            user_inputs: Value::Object(user_inputs.into_iter().collect()),
            step_outputs: HashMap::new(),
        }
    }

    /// Records a completed step's output so later steps can reference it.
    pub fn record(&mut self, step_id: impl Into<String>, output: Value) {
        self.step_outputs.insert(step_id.into(), output);
    }

    pub fn output_of(&self, step_id: &str) -> Option<&Value> {
        self.step_outputs.get(step_id)
    }

    /// Resolves every entry of an `input_mapping` against this state,
    /// producing a flat map suitable for template rendering or direct use
    /// as call parameters.
    pub fn resolve(
        &self,
        input_mapping: &HashMap<String, Value>,
    ) -> Result<HashMap<String, Value>, StateResolutionError> {
        let mut resolved = HashMap::with_capacity(input_mapping.len());
        for (name, expr) in input_mapping {
            resolved.insert(name.clone(), self.resolve_one(expr)?);
        }
        Ok(resolved)
    }

    fn resolve_one(&self, expr: &Value) -> Result<Value, StateResolutionError> {
        let Value::String(s) = expr else {
            return Ok(expr.clone());
        };

        if let Some(rest) = s.strip_prefix(INPUT_PREFIX) {
            return path::traverse_owned(&self.user_inputs, rest)
                .map_err(|e| StateResolutionError::Input(s.clone(), e));
        }

        if let Some((step_id, rest)) = split_reference(s) {
            if let Some(output) = self.step_outputs.get(step_id) {
                return path::traverse_owned(output, rest)
                    .map_err(|e| StateResolutionError::Step(s.clone(), e));
            }
        }

        Ok(expr.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn inputs() -> HashMap<String, Value> {
        let mut m = HashMap::new();
        m.insert("user_id".to_string(), json!("u-42"));
        m.insert("limit".to_string(), json!(10));
        m
    }

    #[test]
    fn resolves_input_reference() {
        let state = StateManager::new(inputs());
        let mut mapping = HashMap::new();
        mapping.insert("id".to_string(), json!("$input.user_id"));
        let resolved = state.resolve(&mapping).unwrap();
        assert_eq!(resolved.get("id"), Some(&json!("u-42")));
    }

    #[test]
    fn resolves_step_output_reference() {
        let mut state = StateManager::new(inputs());
        state.record("fetch_user", json!({"id": 7, "name": "ada"}));

        let mut mapping = HashMap::new();
        mapping.insert("name".to_string(), json!("fetch_user.name"));
        let resolved = state.resolve(&mapping).unwrap();
        assert_eq!(resolved.get("name"), Some(&json!("ada")));
    }

    #[test]
    fn literal_values_pass_through_unchanged() {
        let state = StateManager::new(inputs());
        let mut mapping = HashMap::new();
        mapping.insert("flag".to_string(), json!(true));
        mapping.insert("label".to_string(), json!("active"));
        let resolved = state.resolve(&mapping).unwrap();
        assert_eq!(resolved.get("flag"), Some(&json!(true)));
        assert_eq!(resolved.get("label"), Some(&json!("active")));
    }

    #[test]
    fn unresolvable_step_reference_is_treated_as_literal_when_step_unknown() {
        let state = StateManager::new(inputs());
        let mut mapping = HashMap::new();
        mapping.insert("x".to_string(), json!("not_a_step.field"));
        let resolved = state.resolve(&mapping).unwrap();
        assert_eq!(resolved.get("x"), Some(&json!("not_a_step.field")));
    }

    #[test]
    fn missing_input_path_is_an_error() {
        let state = StateManager::new(inputs());
        let mut mapping = HashMap::new();
        mapping.insert("id".to_string(), json!("$input.missing_field"));
        let err = state.resolve(&mapping).unwrap_err();
        assert!(matches!(err, StateResolutionError::Input(_, _)));
    }

    #[test]
    fn missing_step_output_path_is_an_error() {
        let mut state = StateManager::new(inputs());
        state.record("fetch_user", json!({"id": 7}));
        let mut mapping = HashMap::new();
        mapping.insert("name".to_string(), json!("fetch_user.name"));
        let err = state.resolve(&mapping).unwrap_err();
        assert!(matches!(err, StateResolutionError::Step(_, _)));
    }

    #[test]
    fn output_of_returns_recorded_value() {
        let mut state = StateManager::new(inputs());
        state.record("step1", json!({"a": 1}));
        assert_eq!(state.output_of("step1"), Some(&json!({"a": 1})));
        assert_eq!(state.output_of("missing"), None);
    }
}
