//! Preview runs: synchronous, never persisted, partial results on failure

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::orchestrator::WorkflowOrchestrator;
use super::step_executor::RunContext;
use crate::domain::workflow::{
    ExecutionErrorPayload, ExecutionState, ExecutionStatus, StepTrace, WorkflowDefinition,
    WorkflowError,
};
use crate::infrastructure::credentials::CredentialCache;
use crate::infrastructure::observability::record_execution;

/// Everything computed by a preview run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResult {
    pub workflow_id: String,

    /// COMPLETED, or FAILED when a step halted the preview
    pub status: ExecutionStatus,

    /// Input after defaults and sample values were applied
    pub input: Map<String, Value>,

    pub output: Value,
    pub traces: Vec<StepTrace>,
    pub tokens_used: u64,
    pub warnings: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionErrorPayload>,
}

impl PreviewResult {
    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Completed
    }
}

impl WorkflowOrchestrator {
    /// Dry-run a workflow.
    ///
    /// Missing required inputs get sample values. When every model of a
    /// prompt step fails authentication, a labelled simulated output stands
    /// in. A failing step stops the preview and whatever ran before it is
    /// still returned.
    pub async fn preview(
        &self,
        workflow: &WorkflowDefinition,
        input: &Map<String, Value>,
    ) -> Result<PreviewResult, WorkflowError> {
        let steps = workflow.ordered_steps()?;
        let (prepared, mut warnings) = workflow.prepare_input(input, true)?;

        debug!(workflow_id = %workflow.id, steps = steps.len(), "Starting workflow preview");

        let credentials = CredentialCache::new(self.credentials.clone(), &workflow.owner_id);
        let ctx = RunContext::preview(&credentials);
        let mut state = ExecutionState::new(prepared.clone());
        let mut failure_trace: Option<StepTrace> = None;
        let mut error = None;

        for step in steps {
            match self.executor.run_step(step, &state, ctx).await {
                Ok(next) => {
                    if let Some(trace) = next.traces().last() {
                        warnings.extend(trace.warnings.iter().map(|w| format!("{}: {}", step.name, w)));
                    }
                    state = next;
                }
                Err(failure) => {
                    warnings.extend(
                        failure
                            .trace
                            .warnings
                            .iter()
                            .map(|w| format!("{}: {}", step.name, w)),
                    );
                    warnings.push(format!(
                        "Preview stopped at step '{}': {}",
                        step.name,
                        failure.error.message()
                    ));
                    error = Some(ExecutionErrorPayload::from(&failure.error));
                    failure_trace = Some(failure.trace);
                    break;
                }
            }
        }

        let status = if error.is_some() {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Completed
        };

        let mut traces = state.traces().to_vec();
        traces.extend(failure_trace);

        info!(
            workflow_id = %workflow.id,
            status = %status,
            steps_run = traces.len(),
            warnings = warnings.len(),
            "Workflow preview finished"
        );
        record_execution(status.as_str(), true);

        Ok(PreviewResult {
            workflow_id: workflow.id.clone(),
            status,
            input: prepared,
            output: Value::Object(state.step_input()),
            traces,
            tokens_used: state.total_tokens(),
            warnings,
            error,
        })
    }
}
