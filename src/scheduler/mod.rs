//! Deterministic topological ordering of a validated workflow's steps.
//!
//! Kahn's algorithm with a sorted frontier: among all steps currently ready
//! to run, the lexicographically smallest step id always goes first. Two
//! workflows with the same steps and edges always produce the same order.

use std::collections::{BTreeSet, HashMap};

use thiserror::Error;

use crate::protocol::Workflow;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// The algorithm halted before covering every step. A validated,
    /// acyclic workflow can never reach this; seeing it means the workflow
    /// was scheduled without having gone through `validation::validate`.
    #[error("topological sort covered {covered} of {total} steps; the workflow contains a cycle")]
    IncompleteCoverage { covered: usize, total: usize },
}

/// Returns a total order over `workflow.steps` consistent with its edges,
/// with ties broken by step id.
pub fn topological_order(workflow: &Workflow) -> Result<Vec<String>, ScheduleError> {
    let total = workflow.steps.len();

    let mut in_degree: HashMap<&str, usize> =
        workflow.steps.iter().map(|s| (s.id.as_str(), 0)).collect();
    let mut successors: HashMap<&str, Vec<&str>> =
        workflow.steps.iter().map(|s| (s.id.as_str(), Vec::new())).collect();

    for edge in &workflow.edges {
        successors.entry(edge.from.as_str()).or_default().push(edge.to.as_str());
        *in_degree.entry(edge.to.as_str()).or_insert(0) += 1;
    }
    for succs in successors.values_mut() {
        succs.sort_unstable();
    }

    let mut frontier: BTreeSet<&str> = in_degree
        .iter()
        .filter(|(_, &degree)| degree == 0)
        .map(|(&id, _)| id)
        .collect();

    let mut order = Vec::with_capacity(total);
    while let Some(&node) = frontier.iter().next() {
        frontier.remove(node);
        order.push(node.to_string());

        if let Some(succs) = successors.get(node) {
            for &next in succs {
                let degree = in_degree.get_mut(next).expect("successor is a known step");
                *degree -= 1;
                if *degree == 0 {
                    frontier.insert(next);
                }
            }
        }
    }

    if order.len() != total {
        return Err(ScheduleError::IncompleteCoverage { covered: order.len(), total });
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Edge, Step, Workflow};
    use std::collections::HashMap;

    fn step(id: &str) -> Step {
        Step {
            id: id.to_string(),
            name: id.to_string(),
            tool_id: "t".to_string(),
            input_mapping: HashMap::new(),
        }
    }

    fn workflow(steps: Vec<Step>, edges: Vec<Edge>) -> Workflow {
        Workflow { id: "wf".to_string(), name: "wf".to_string(), steps, edges }
    }

    #[test]
    fn orders_a_diamond() {
        let wf = workflow(
            vec![step("step_1"), step("step_2"), step("step_3"), step("step_4")],
            vec![
                Edge { from: "step_1".into(), to: "step_2".into() },
                Edge { from: "step_1".into(), to: "step_3".into() },
                Edge { from: "step_2".into(), to: "step_4".into() },
                Edge { from: "step_3".into(), to: "step_4".into() },
            ],
        );
        let order = topological_order(&wf).unwrap();
        assert_eq!(order, vec!["step_1", "step_2", "step_3", "step_4"]);
    }

    #[test]
    fn breaks_ties_by_sorted_step_id() {
        let wf = workflow(vec![step("b"), step("a"), step("c")], vec![]);
        let order = topological_order(&wf).unwrap();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn empty_workflow_produces_empty_order() {
        let wf = workflow(vec![], vec![]);
        assert_eq!(topological_order(&wf).unwrap(), Vec::<String>::new());
    }

    #[test]
    fn single_step_with_no_edges() {
        let wf = workflow(vec![step("only")], vec![]);
        assert_eq!(topological_order(&wf).unwrap(), vec!["only"]);
    }

    #[test]
    fn two_equivalent_workflows_produce_identical_orderings() {
        let wf_a = workflow(
            vec![step("x"), step("y")],
            vec![Edge { from: "x".into(), to: "y".into() }],
        );
        let wf_b = workflow(
            vec![step("y"), step("x")],
            vec![Edge { from: "x".into(), to: "y".into() }],
        );
        assert_eq!(topological_order(&wf_a).unwrap(), topological_order(&wf_b).unwrap());
    }

    #[test]
    fn cyclic_input_is_reported_as_incomplete_coverage() {
        let wf = workflow(
            vec![step("a"), step("b")],
            vec![
                Edge { from: "a".into(), to: "b".into() },
                Edge { from: "b".into(), to: "a".into() },
            ],
        );
        let err = topological_order(&wf).unwrap_err();
        assert!(matches!(err, ScheduleError::IncompleteCoverage { .. }));
    }
}
