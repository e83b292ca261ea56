//! Run Executor: drives validate → schedule → iterate for a single run.
//!
//! Owns one shared `reqwest::Client`-backed transport per instance, so
//! concurrent runs on the same `RunExecutor` share a connection pool without
//! leaking per-call state (headers, auth) across calls — each call builds
//! its own `PreparedRequest` from scratch.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::dispatcher::{self, HttpTransport, ReqwestTransport};
use crate::errors::StepExecutionError;
use crate::protocol::{
    Run, RunStatus, Step, StepResult, StepStatus, ToolConfig, ToolConfigs, ToolRegistry, Workflow,
};
use crate::scheduler;
use crate::state::StateManager;
use crate::validation;

pub type StepCompleteCallback<'a> = dyn Fn(&StepResult) + Send + Sync + 'a;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Drives one run at a time (runs are independent; create one executor per
/// concurrent caller, or share one across callers that don't need isolated
/// cancellation).
pub struct RunExecutor {
    transport: Box<dyn HttpTransport>,
    timeout: Duration,
    cancelled: AtomicBool,
}

impl RunExecutor {
    pub fn new(transport: Box<dyn HttpTransport>) -> Self {
        Self { transport, timeout: DEFAULT_TIMEOUT, cancelled: AtomicBool::new(false) }
    }

    pub fn with_reqwest_client(client: reqwest::Client) -> Self {
        Self::new(Box::new(ReqwestTransport::new(client)))
    }

    /// Overrides the per-call HTTP timeout (default 30s).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Requests cooperative cancellation. Checked between steps; a step
    /// already dispatching runs to completion.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    #[tracing::instrument(skip_all, fields(workflow_id = %workflow.id))]
    pub async fn execute(
        &self,
        workflow: &Workflow,
        tool_registry: &ToolRegistry,
        user_inputs: HashMap<String, Value>,
        tool_configs: &ToolConfigs,
        on_step_complete: Option<&StepCompleteCallback<'_>>,
    ) -> Run {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4().to_string();

        let normalized = match validation::validate(workflow, tool_registry) {
            Ok(wf) => wf,
            Err(errors) => {
                let reasons: Vec<String> = errors.iter().map(ToString::to_string).collect();
                tracing::warn!(workflow_id = %workflow.id, reasons = %reasons.join("; "), "workflow rejected by validation");
                return Run {
                    id: run_id,
                    workflow_id: workflow.id.clone(),
                    status: RunStatus::Failed,
                    user_inputs,
                    step_results: Vec::new(),
                    started_at,
                    finished_at: Some(Utc::now()),
                };
            }
        };

        let order = match scheduler::topological_order(&normalized) {
            Ok(order) => order,
            Err(e) => {
                tracing::error!(workflow_id = %workflow.id, "{e}");
                return Run {
                    id: run_id,
                    workflow_id: workflow.id.clone(),
                    status: RunStatus::Failed,
                    user_inputs,
                    step_results: Vec::new(),
                    started_at,
                    finished_at: Some(Utc::now()),
                };
            }
        };

        let steps_by_id: HashMap<&str, &Step> =
            normalized.steps.iter().map(|s| (s.id.as_str(), s)).collect();
        let mut state = StateManager::new(user_inputs.clone());

        tracing::info!(workflow_id = %workflow.id, step_count = order.len(), status = ?RunStatus::Running, "run started");

        // Pre-populate every step as PENDING before any step runs, so the
        // lifecycle is PENDING -> RUNNING -> (SUCCESS | FAILED | SKIPPED).
        let mut step_results: Vec<StepResult> = order
            .iter()
            .map(|id| StepResult {
                step_id: id.clone(),
                status: StepStatus::Pending,
                output: None,
                error: None,
                started_at,
                finished_at: None,
            })
            .collect();
        let mut halted = false;

        for (idx, step_id) in order.iter().enumerate() {
            let step = steps_by_id[step_id.as_str()];

            let result = if halted {
                let now = Utc::now();
                StepResult {
                    step_id: step.id.clone(),
                    status: StepStatus::Skipped,
                    output: None,
                    error: None,
                    started_at: now,
                    finished_at: Some(now),
                }
            } else if self.is_cancelled() {
                halted = true;
                let now = Utc::now();
                StepResult {
                    step_id: step.id.clone(),
                    status: StepStatus::Failed,
                    output: None,
                    error: Some(StepExecutionError::Cancellation.to_string()),
                    started_at: now,
                    finished_at: Some(now),
                }
            } else {
                step_results[idx].status = StepStatus::Running;
                step_results[idx].started_at = Utc::now();

                let result = self.run_step(step, tool_registry, tool_configs, &state).await;
                if result.status == StepStatus::Success {
                    if let Some(output) = &result.output {
                        state.record(step.id.clone(), output.clone());
                    }
                } else {
                    halted = true;
                }
                result
            };

            if let Some(cb) = on_step_complete {
                cb(&result);
            }
            step_results[idx] = result;
        }

        let status = if step_results.iter().any(|r| r.status == StepStatus::Failed) {
            RunStatus::Failed
        } else {
            RunStatus::Success
        };

        Run {
            id: run_id,
            workflow_id: workflow.id.clone(),
            status,
            user_inputs,
            step_results,
            started_at,
            finished_at: Some(Utc::now()),
        }
    }

    #[tracing::instrument(skip_all, fields(step_id = %step.id))]
    async fn run_step(
        &self,
        step: &Step,
        tool_registry: &ToolRegistry,
        tool_configs: &ToolConfigs,
        state: &StateManager,
    ) -> StepResult {
        let started_at = Utc::now();
        let outcome = self.run_step_inner(step, tool_registry, tool_configs, state).await;
        let finished_at = Some(Utc::now());

        match outcome {
            Ok(output) => StepResult {
                step_id: step.id.clone(),
                status: StepStatus::Success,
                output: Some(output),
                error: None,
                started_at,
                finished_at,
            },
            Err(e) => {
                tracing::warn!(step_id = %step.id, error_kind = e.error_kind(), "step failed: {e}");
                StepResult {
                    step_id: step.id.clone(),
                    status: StepStatus::Failed,
                    output: None,
                    error: Some(e.to_string()),
                    started_at,
                    finished_at,
                }
            }
        }
    }

    async fn run_step_inner(
        &self,
        step: &Step,
        tool_registry: &ToolRegistry,
        tool_configs: &ToolConfigs,
        state: &StateManager,
    ) -> Result<Value, StepExecutionError> {
        let tool = tool_registry
            .tools
            .get(&step.tool_id)
            .expect("tool resolution already validated");
        let resolved = state.resolve(&step.input_mapping)?;
        let default_config = ToolConfig::default();
        let config = tool_configs.get(&step.tool_id).unwrap_or(&default_config);
        dispatcher::dispatch(self.transport.as_ref(), tool, resolved, config, self.timeout).await
    }
}
