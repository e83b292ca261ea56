//! Error taxonomy for workflow validation and step execution.
//!
//! Every runtime failure carries a stable `error_kind` string discriminant
//! alongside its `Display` message, so callers and logs can switch on the
//! kind of failure without parsing text — a scaled-down analogue of a
//! numeric error-code scheme, sized to what this crate's own failure modes
//! need.

use thiserror::Error;

/// Failures found while checking a workflow before any step runs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkflowValidationError {
    #[error("workflow has no steps")]
    EmptyWorkflow,

    #[error("step at index {index} has an empty id")]
    EmptyStepId { index: usize },

    #[error("duplicate step id '{0}'")]
    DuplicateStepId(String),

    #[error("edge references unknown step '{0}'")]
    UnknownEdgeEndpoint(String),

    #[error(
        "step '{step_id}' input '{input_name}' references step '{reference}', which does not run before it"
    )]
    UnreachableReference {
        step_id: String,
        input_name: String,
        reference: String,
    },

    #[error("circular dependency detected at step '{0}'")]
    CircularDependency(String),

    #[error("step '{step_id}' references unknown tool '{tool_id}'")]
    UnknownTool { step_id: String, tool_id: String },
}

impl WorkflowValidationError {
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::EmptyWorkflow => "empty_workflow",
            Self::EmptyStepId { .. } => "empty_step_id",
            Self::DuplicateStepId(_) => "duplicate_step_id",
            Self::UnknownEdgeEndpoint(_) => "unknown_edge_endpoint",
            Self::UnreachableReference { .. } => "unreachable_reference",
            Self::CircularDependency(_) => "circular_dependency",
            Self::UnknownTool { .. } => "unknown_tool",
        }
    }
}

/// Failures that can occur while a single step is resolved, dispatched, or
/// its response is extracted. These become a `FAILED` `StepResult` rather
/// than aborting the run.
#[derive(Debug, Error)]
pub enum StepExecutionError {
    #[error("state resolution failed: {0}")]
    StateResolution(#[from] crate::state::StateResolutionError),

    #[error("template error: {0}")]
    Template(#[from] crate::template::TemplateKeyError),

    #[error("dispatch error: {0}")]
    Dispatch(String),

    #[error("extraction error: {0}")]
    Extraction(#[from] crate::path::PathError),

    #[error("step cancelled")]
    Cancellation,
}

impl StepExecutionError {
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::StateResolution(_) => "state_resolution",
            Self::Template(_) => "template",
            Self::Dispatch(_) => "dispatch",
            Self::Extraction(_) => "extraction",
            Self::Cancellation => "cancellation",
        }
    }
}
