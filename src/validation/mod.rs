//! Workflow validation: edge inference, structural checks, cycle detection,
//! and reachability of data-flow references.
//!
//! Validation is a sequence of ordered passes. Each pass collects every
//! error it finds and aborts the sequence on failure — later passes assume
//! earlier ones held. `validate` returns a normalised copy of the workflow
//! (edges completed by inference); callers must use that copy, not their
//! original.

use std::collections::{BTreeSet, HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::errors::WorkflowValidationError;
use crate::protocol::{Edge, Step, ToolRegistry, Workflow};

static REFERENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\..+$").expect("valid reference regex"));

const INPUT_PREFIX: &str = "$input.";

type Errors = Vec<WorkflowValidationError>;

/// Runs every validation pass and returns the normalised workflow (with
/// edges completed by inference) on success.
pub fn validate(workflow: &Workflow, tool_registry: &ToolRegistry) -> Result<Workflow, Errors> {
    check_ids(workflow)?;

    let mut workflow = workflow.clone();
    workflow.edges = infer_edges(&workflow);

    check_edge_endpoints(&workflow)?;
    check_acyclic(&workflow)?;
    check_mapping_reachability(&workflow)?;
    check_tool_resolution(&workflow, tool_registry)?;

    Ok(workflow)
}

/// A reference-shaped input mapping value: `<prefix>.<rest>`, not an
/// `$input.` reference. Returns the prefix.
fn step_reference_prefix(value: &Value) -> Option<&str> {
    let Value::String(s) = value else {
        return None;
    };
    if s.starts_with(INPUT_PREFIX) {
        return None;
    }
    REFERENCE_RE
        .captures(s)
        .map(|caps| caps.get(1).unwrap().as_str())
}

/// Scans every step's input mapping for references into another step's
/// output and returns the union of those edges with the declared ones.
pub fn infer_edges(workflow: &Workflow) -> Vec<Edge> {
    let step_ids: HashSet<&str> = workflow.steps.iter().map(|s| s.id.as_str()).collect();

    let mut edges: BTreeSet<(String, String)> = workflow
        .edges
        .iter()
        .map(|e| (e.from.clone(), e.to.clone()))
        .collect();

    for step in &workflow.steps {
        let mut names: Vec<&String> = step.input_mapping.keys().collect();
        names.sort();
        for name in names {
            if let Some(prefix) = step_reference_prefix(&step.input_mapping[name]) {
                if prefix != step.id && step_ids.contains(prefix) {
                    edges.insert((prefix.to_string(), step.id.clone()));
                }
            }
        }
    }

    edges.into_iter().map(|(from, to)| Edge { from, to }).collect()
}

fn check_ids(workflow: &Workflow) -> Result<(), Errors> {
    let mut errors = Errors::new();

    let mut seen = HashSet::new();
    for (index, step) in workflow.steps.iter().enumerate() {
        if step.id.trim().is_empty() {
            errors.push(WorkflowValidationError::EmptyStepId { index });
            continue;
        }
        if !seen.insert(step.id.as_str()) {
            errors.push(WorkflowValidationError::DuplicateStepId(step.id.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_edge_endpoints(workflow: &Workflow) -> Result<(), Errors> {
    let step_ids: HashSet<&str> = workflow.steps.iter().map(|s| s.id.as_str()).collect();
    let mut errors = Errors::new();

    let mut edges: Vec<&Edge> = workflow.edges.iter().collect();
    edges.sort_by(|a, b| (a.from.as_str(), a.to.as_str()).cmp(&(b.from.as_str(), b.to.as_str())));

    for edge in edges {
        if !step_ids.contains(edge.from.as_str()) {
            errors.push(WorkflowValidationError::UnknownEdgeEndpoint(edge.from.clone()));
        }
        if !step_ids.contains(edge.to.as_str()) {
            errors.push(WorkflowValidationError::UnknownEdgeEndpoint(edge.to.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn build_successor_graph(workflow: &Workflow) -> HashMap<&str, Vec<&str>> {
    let mut graph: HashMap<&str, Vec<&str>> = HashMap::new();
    for step in &workflow.steps {
        graph.entry(step.id.as_str()).or_default();
    }
    for edge in &workflow.edges {
        graph.entry(edge.from.as_str()).or_default().push(edge.to.as_str());
    }
    for successors in graph.values_mut() {
        successors.sort_unstable();
    }
    graph
}

fn check_acyclic(workflow: &Workflow) -> Result<(), Errors> {
    let graph = build_successor_graph(workflow);
    let mut color: HashMap<&str, u8> =
        workflow.steps.iter().map(|s| (s.id.as_str(), 0u8)).collect();
    let mut errors = Errors::new();

    let mut ids: Vec<&str> = workflow.steps.iter().map(|s| s.id.as_str()).collect();
    ids.sort_unstable();

    for id in ids {
        if color[id] == 0 {
            if detect_cycle_dfs(id, &graph, &mut color, &mut errors) {
                break;
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Three-colour DFS: white (0) unvisited, grey (1) on the current path,
/// black (2) finished. A grey node reached again is a cycle.
fn detect_cycle_dfs<'a>(
    node: &'a str,
    graph: &HashMap<&'a str, Vec<&'a str>>,
    color: &mut HashMap<&'a str, u8>,
    errors: &mut Errors,
) -> bool {
    color.insert(node, 1);

    if let Some(successors) = graph.get(node) {
        for &next in successors {
            match color.get(next) {
                Some(1) => {
                    errors.push(WorkflowValidationError::CircularDependency(node.to_string()));
                    return true;
                }
                Some(0) => {
                    if detect_cycle_dfs(next, graph, color, errors) {
                        return true;
                    }
                }
                _ => {}
            }
        }
    }

    color.insert(node, 2);
    false
}

fn ancestors_of<'a>(start: &'a str, predecessors: &HashMap<&'a str, Vec<&'a str>>) -> HashSet<&'a str> {
    let mut seen = HashSet::new();
    let mut stack = vec![start];
    while let Some(node) = stack.pop() {
        if let Some(preds) = predecessors.get(node) {
            for &p in preds {
                if seen.insert(p) {
                    stack.push(p);
                }
            }
        }
    }
    seen
}

fn check_mapping_reachability(workflow: &Workflow) -> Result<(), Errors> {
    let step_ids: HashSet<&str> = workflow.steps.iter().map(|s| s.id.as_str()).collect();

    let mut predecessors: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in &workflow.edges {
        predecessors.entry(edge.to.as_str()).or_default().push(edge.from.as_str());
    }

    let mut errors = Errors::new();
    let mut steps: Vec<&Step> = workflow.steps.iter().collect();
    steps.sort_by(|a, b| a.id.cmp(&b.id));

    for step in steps {
        let ancestors = ancestors_of(step.id.as_str(), &predecessors);

        let mut names: Vec<&String> = step.input_mapping.keys().collect();
        names.sort();
        for name in names {
            if let Some(reference) = step_reference_prefix(&step.input_mapping[name]) {
                if step_ids.contains(reference) && !ancestors.contains(reference) {
                    errors.push(WorkflowValidationError::UnreachableReference {
                        step_id: step.id.clone(),
                        input_name: name.clone(),
                        reference: reference.to_string(),
                    });
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_tool_resolution(workflow: &Workflow, tool_registry: &ToolRegistry) -> Result<(), Errors> {
    let mut errors = Errors::new();
    let mut steps: Vec<&Step> = workflow.steps.iter().collect();
    steps.sort_by(|a, b| a.id.cmp(&b.id));

    for step in steps {
        if !tool_registry.tools.contains_key(&step.tool_id) {
            errors.push(WorkflowValidationError::UnknownTool {
                step_id: step.id.clone(),
                tool_id: step.tool_id.clone(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap as Map;

    fn step(id: &str, tool_id: &str, input_mapping: &[(&str, Value)]) -> Step {
        Step {
            id: id.to_string(),
            name: id.to_string(),
            tool_id: tool_id.to_string(),
            input_mapping: input_mapping
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        }
    }

    fn workflow(steps: Vec<Step>, edges: Vec<Edge>) -> Workflow {
        Workflow {
            id: "wf".to_string(),
            name: "test workflow".to_string(),
            steps,
            edges,
        }
    }

    fn registry_with(tool_ids: &[&str]) -> ToolRegistry {
        use crate::protocol::{HttpMethod, ToolDefinition};
        let mut tools = Map::new();
        for id in tool_ids {
            tools.insert(
                id.to_string(),
                ToolDefinition {
                    id: id.to_string(),
                    name: id.to_string(),
                    base_url: "https://api.test".to_string(),
                    method: HttpMethod::Get,
                    path: "/x".to_string(),
                    auth_type: None,
                    auth_header: None,
                    parameters: vec![],
                    auth: None,
                    request: None,
                    response_extract: None,
                },
            );
        }
        ToolRegistry { tools }
    }

    #[test]
    fn infers_edges_from_step_references() {
        let wf = workflow(
            vec![
                step("step_1", "t", &[]),
                step("step_2", "t", &[("x", json!("step_1.a"))]),
            ],
            vec![],
        );
        let edges = infer_edges(&wf);
        assert_eq!(edges, vec![Edge { from: "step_1".into(), to: "step_2".into() }]);
    }

    #[test]
    fn inference_ignores_input_references_and_self_references() {
        let wf = workflow(
            vec![step(
                "step_1",
                "t",
                &[("x", json!("$input.foo")), ("y", json!("step_1.bar"))],
            )],
            vec![],
        );
        assert!(infer_edges(&wf).is_empty());
    }

    #[test]
    fn diamond_workflow_validates_with_four_inferred_edges() {
        let wf = workflow(
            vec![
                step("step_1", "t", &[]),
                step("step_2", "t", &[("x", json!("step_1.a"))]),
                step("step_3", "t", &[("y", json!("step_1.b"))]),
                step(
                    "step_4",
                    "t",
                    &[("p", json!("step_2.r")), ("q", json!("step_3.r"))],
                ),
            ],
            vec![],
        );
        let registry = registry_with(&["t"]);
        let normalized = validate(&wf, &registry).unwrap();
        assert_eq!(normalized.edges.len(), 4);
    }

    #[test]
    fn rejects_three_node_cycle() {
        let wf = workflow(
            vec![step("a", "t", &[]), step("b", "t", &[]), step("c", "t", &[])],
            vec![
                Edge { from: "a".into(), to: "b".into() },
                Edge { from: "b".into(), to: "c".into() },
                Edge { from: "c".into(), to: "a".into() },
            ],
        );
        let registry = registry_with(&["t"]);
        let errors = validate(&wf, &registry).unwrap_err();
        assert!(errors.iter().any(|e| matches!(e, WorkflowValidationError::CircularDependency(_))));
    }

    #[test]
    fn unreachable_reference_is_rejected() {
        // s2 references s1's output, but the edge is not declared and s1
        // does not appear as a prefix in a reference-shaped value, so
        // inference has nothing to find; mimic by using a reference whose
        // prefix resolves to a step that inference excluded: self-reference.
        let wf = workflow(vec![step("s1", "t", &[("x", json!("s1.y"))])], vec![]);
        let registry = registry_with(&["t"]);
        let errors = validate(&wf, &registry).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, WorkflowValidationError::UnreachableReference { .. })));
    }

    #[test]
    fn unknown_tool_is_rejected() {
        let wf = workflow(vec![step("s1", "missing_tool", &[])], vec![]);
        let registry = registry_with(&["other_tool"]);
        let errors = validate(&wf, &registry).unwrap_err();
        assert!(errors.iter().any(|e| matches!(e, WorkflowValidationError::UnknownTool { .. })));
    }

    #[test]
    fn duplicate_step_ids_are_rejected() {
        let wf = workflow(vec![step("s1", "t", &[]), step("s1", "t", &[])], vec![]);
        let registry = registry_with(&["t"]);
        let errors = validate(&wf, &registry).unwrap_err();
        assert!(errors.iter().any(|e| matches!(e, WorkflowValidationError::DuplicateStepId(_))));
    }

    #[test]
    fn empty_workflow_validates() {
        let wf = workflow(vec![], vec![]);
        let registry = registry_with(&[]);
        let normalized = validate(&wf, &registry).expect("zero-step workflow should validate");
        assert!(normalized.steps.is_empty());
        assert!(normalized.edges.is_empty());
    }

    #[test]
    fn declared_edge_to_unknown_step_is_rejected() {
        let wf = workflow(
            vec![step("s1", "t", &[])],
            vec![Edge { from: "s1".into(), to: "ghost".into() }],
        );
        let registry = registry_with(&["t"]);
        let errors = validate(&wf, &registry).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, WorkflowValidationError::UnknownEdgeEndpoint(_))));
    }
}
