//! Data model for workflows: tool definitions, steps, runs and their results.
//!
//! A `Workflow` is a DAG of `Step`s. Each step names a `ToolDefinition` (an
//! HTTP endpoint) and an `input_mapping` describing where its call
//! parameters come from — literals, `$input.*` references into the run's
//! user inputs, or `<step_id>.*` references into another step's recorded
//! output.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

// ============================================================================
// TOOL DEFINITION
// ============================================================================

/// HTTP method a tool definition may issue.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_reqwest(&self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Legacy auth kind, declared directly on the tool definition.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LegacyAuthType {
    None,
    ApiKey,
    Bearer,
}

/// Structured auth kind, declared under `auth`.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    None,
    ApiKey,
    Bearer,
    Basic,
}

/// Structured auth configuration.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AuthConfig {
    #[serde(rename = "type")]
    pub auth_type: AuthType,
    /// Header name to use for `api_key` auth. Defaults to `X-API-Key`.
    #[serde(default)]
    pub header: Option<String>,
}

/// Structured per-request template configuration.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct RequestSpec {
    /// Names substituted into `{name}` placeholders in `path`.
    #[serde(default)]
    pub path_params: Vec<String>,
    /// Names sent as `?key=value` query parameters.
    #[serde(default)]
    pub query_params: Vec<String>,
    /// Header template map; values may contain `{{key}}` placeholders.
    #[serde(default)]
    pub headers: HashMap<String, Value>,
    /// Body template; rendered recursively with type-preserving substitution.
    #[serde(default)]
    pub body: Option<Value>,
}

/// Declares how fields of the HTTP response populate the step's output.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ResponseExtract {
    /// Output field name -> dotted path into the parsed response body.
    #[serde(default)]
    pub fields: HashMap<String, String>,
    /// If true, a missing path is a `StepExecutionError`; otherwise the
    /// field is simply omitted from the output.
    #[serde(default)]
    pub strict: bool,
}

/// Immutable description of a callable HTTP endpoint.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ToolDefinition {
    pub id: String,
    pub name: String,
    pub base_url: String,
    pub method: HttpMethod,
    /// May contain `{name}` placeholders resolved from `path_params`
    /// (structured) or from any matching input name (legacy).
    pub path: String,

    #[serde(default)]
    pub auth_type: Option<LegacyAuthType>,
    #[serde(default)]
    pub auth_header: Option<String>,
    /// Legacy: the flat list of input names this tool accepts.
    #[serde(default)]
    pub parameters: Vec<String>,

    #[serde(default)]
    pub auth: Option<AuthConfig>,
    /// Presence of `request` selects the structured dispatch path.
    #[serde(default)]
    pub request: Option<RequestSpec>,
    #[serde(default)]
    pub response_extract: Option<ResponseExtract>,
}

impl ToolDefinition {
    /// True when this tool should be dispatched via the structured path.
    pub fn is_structured(&self) -> bool {
        self.request.is_some()
    }
}

// ============================================================================
// WORKFLOW
// ============================================================================

/// A declared edge between two step ids (`from` must run before `to`).
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq, Hash)]
pub struct Edge {
    pub from: String,
    pub to: String,
}

/// One node of the workflow DAG.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Step {
    pub id: String,
    pub name: String,
    pub tool_id: String,
    /// Maps a tool input name to a reference expression: a literal JSON
    /// value, `"$input.<path>"`, or `"<step_id>.<path>"`.
    #[serde(default)]
    pub input_mapping: HashMap<String, Value>,
}

/// A DAG of steps plus whatever edges were declared up front. The
/// validator fills in edges inferred from `input_mapping` before scheduling.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Workflow {
    pub id: String,
    pub name: String,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

// ============================================================================
// RUN / STEP RESULT
// ============================================================================

#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Success,
    Failed,
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StepResult {
    pub step_id: String,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Run {
    pub id: String,
    pub workflow_id: String,
    pub status: RunStatus,
    pub user_inputs: HashMap<String, Value>,
    pub step_results: Vec<StepResult>,
    pub started_at: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
}

// ============================================================================
// PERSISTED ENVELOPES (CLI / loader surface)
// ============================================================================

/// `id -> ToolDefinition` lookup table, as handed to `execute`.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ToolRegistry {
    pub tools: HashMap<String, ToolDefinition>,
}

/// Everything `execute` needs besides the workflow and registry: the
/// caller-supplied `$input.*` values.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct RunRequest {
    #[serde(default)]
    pub user_inputs: HashMap<String, Value>,
}

/// Per-tool runtime secrets, supplied out-of-band from the workflow and
/// tool registry and never persisted alongside them.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ToolConfig {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// `tool_id -> ToolConfig`, as handed to `execute`.
pub type ToolConfigs = HashMap<String, ToolConfig>;
