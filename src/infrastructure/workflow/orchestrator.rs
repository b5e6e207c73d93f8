//! Live workflow runs: validation, persistence, sequential steps, cancellation

use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::step_executor::{RunContext, StepExecutor};
use crate::domain::workflow::{
    ExecutionErrorPayload, ExecutionRepository, ExecutionState, ExecutionStatus, StepTrace,
    WorkflowDefinition, WorkflowError, WorkflowExecution,
};
use crate::domain::CredentialResolver;
use crate::infrastructure::credentials::CredentialCache;
use crate::infrastructure::observability::record_execution;

/// Runs workflow definitions step by step and tracks them as executions
#[derive(Debug, Clone)]
pub struct WorkflowOrchestrator {
    pub(super) executor: StepExecutor,
    repository: Arc<dyn ExecutionRepository>,
    pub(super) credentials: Arc<dyn CredentialResolver>,
}

impl WorkflowOrchestrator {
    pub fn new(
        executor: StepExecutor,
        repository: Arc<dyn ExecutionRepository>,
        credentials: Arc<dyn CredentialResolver>,
    ) -> Self {
        Self {
            executor,
            repository,
            credentials,
        }
    }

    pub fn repository(&self) -> &Arc<dyn ExecutionRepository> {
        &self.repository
    }

    /// Run a workflow to completion.
    ///
    /// Invalid definitions and inputs are rejected before any execution is
    /// recorded. A failing step yields a FAILED execution, not an error.
    pub async fn execute(
        &self,
        workflow: &WorkflowDefinition,
        input: &Map<String, Value>,
    ) -> Result<WorkflowExecution, WorkflowError> {
        let execution = self.create_execution(workflow, input).await?;
        self.run(workflow, execution).await
    }

    /// Record a PENDING execution and run it in the background
    pub async fn start_detached(
        &self,
        workflow: WorkflowDefinition,
        input: &Map<String, Value>,
    ) -> Result<Uuid, WorkflowError> {
        let execution = self.create_execution(&workflow, input).await?;
        let execution_id = execution.id;
        let orchestrator = self.clone();

        tokio::spawn(async move {
            if let Err(e) = orchestrator.run(&workflow, execution).await {
                error!(
                    execution_id = %execution_id,
                    workflow_id = %workflow.id,
                    error = %e,
                    "Detached workflow execution failed"
                );
            }
        });

        Ok(execution_id)
    }

    pub async fn get(&self, execution_id: &Uuid) -> Result<WorkflowExecution, WorkflowError> {
        self.repository
            .get(execution_id)
            .await?
            .ok_or_else(|| WorkflowError::execution_not_found(execution_id.to_string()))
    }

    /// Mark an execution CANCELLED; a running execution stops before its next step
    pub async fn cancel(&self, execution_id: &Uuid) -> Result<WorkflowExecution, WorkflowError> {
        let mut execution = self.get(execution_id).await?;
        execution.cancel()?;
        let execution = self.repository.update(execution).await?;

        info!(
            execution_id = %execution_id,
            workflow_id = %execution.workflow_id,
            "Workflow execution cancelled"
        );
        record_execution(ExecutionStatus::Cancelled.as_str(), false);

        Ok(execution)
    }

    async fn create_execution(
        &self,
        workflow: &WorkflowDefinition,
        input: &Map<String, Value>,
    ) -> Result<WorkflowExecution, WorkflowError> {
        workflow.ordered_steps()?;
        let (prepared, _) = workflow.prepare_input(input, false)?;

        let execution = WorkflowExecution::new(&workflow.id, &workflow.owner_id, prepared);
        Ok(self.repository.create(execution).await?)
    }

    async fn run(
        &self,
        workflow: &WorkflowDefinition,
        mut execution: WorkflowExecution,
    ) -> Result<WorkflowExecution, WorkflowError> {
        if self.is_cancelled(&execution.id).await? {
            return self.get(&execution.id).await;
        }

        execution.start()?;
        let execution = self.repository.update(execution).await?;
        let execution_id = execution.id;

        match self.run_steps(workflow, execution).await {
            Ok(execution) => Ok(execution),
            Err(e) => {
                self.abandon(&execution_id, &e).await;
                Err(e)
            }
        }
    }

    async fn run_steps(
        &self,
        workflow: &WorkflowDefinition,
        execution: WorkflowExecution,
    ) -> Result<WorkflowExecution, WorkflowError> {
        let steps = workflow.ordered_steps()?;
        let started = Instant::now();

        info!(
            execution_id = %execution.id,
            workflow_id = %workflow.id,
            steps = steps.len(),
            "Workflow execution started"
        );

        let credentials = CredentialCache::new(self.credentials.clone(), &workflow.owner_id);
        let ctx = RunContext::live(&credentials, execution.id);
        let mut state = ExecutionState::new(execution.input.clone());

        for step in steps {
            if self.is_cancelled(&execution.id).await? {
                return self
                    .finish_cancelled(&execution.id, state.traces().to_vec(), state.total_tokens())
                    .await;
            }

            match self.executor.run_step(step, &state, ctx).await {
                Ok(next) => state = next,
                Err(failure) => {
                    let mut traces = state.traces().to_vec();
                    traces.push(failure.trace);
                    return self
                        .finish_failed(&execution.id, &failure.error, traces, state.total_tokens())
                        .await;
                }
            }
        }

        // Re-read so a cancellation that landed during the last step is kept
        let mut execution = self.get(&execution.id).await?;
        if execution.status == ExecutionStatus::Cancelled {
            return self
                .finish_cancelled(&execution.id, state.traces().to_vec(), state.total_tokens())
                .await;
        }

        execution.complete(
            Value::Object(state.step_input()),
            state.traces().to_vec(),
            state.total_tokens(),
        )?;
        let execution = self.repository.update(execution).await?;

        info!(
            execution_id = %execution.id,
            workflow_id = %workflow.id,
            tokens_used = execution.tokens_used,
            duration_ms = started.elapsed().as_millis() as u64,
            "Workflow execution completed"
        );
        record_execution(ExecutionStatus::Completed.as_str(), false);

        Ok(execution)
    }

    async fn is_cancelled(&self, execution_id: &Uuid) -> Result<bool, WorkflowError> {
        Ok(self
            .repository
            .get(execution_id)
            .await?
            .is_some_and(|e| e.status == ExecutionStatus::Cancelled))
    }

    async fn finish_failed(
        &self,
        execution_id: &Uuid,
        error: &WorkflowError,
        traces: Vec<StepTrace>,
        tokens_used: u64,
    ) -> Result<WorkflowExecution, WorkflowError> {
        let mut execution = self.get(execution_id).await?;
        if execution.status == ExecutionStatus::Cancelled {
            return self.finish_cancelled(execution_id, traces, tokens_used).await;
        }

        execution.fail(ExecutionErrorPayload::from(error), traces, tokens_used)?;
        let execution = self.repository.update(execution).await?;

        warn!(
            execution_id = %execution.id,
            workflow_id = %execution.workflow_id,
            error = %error,
            "Workflow execution failed"
        );
        record_execution(ExecutionStatus::Failed.as_str(), false);

        Ok(execution)
    }

    /// Keep the CANCELLED status set externally, attaching the traces so far
    async fn finish_cancelled(
        &self,
        execution_id: &Uuid,
        traces: Vec<StepTrace>,
        tokens_used: u64,
    ) -> Result<WorkflowExecution, WorkflowError> {
        let mut execution = self.get(execution_id).await?;
        execution.traces = traces;
        execution.tokens_used = tokens_used;
        let execution = self.repository.update(execution).await?;

        info!(
            execution_id = %execution_id,
            steps_completed = execution.traces.len(),
            "Workflow execution stopped after cancellation"
        );

        Ok(execution)
    }

    /// Best effort: mark a run FAILED when bookkeeping broke mid-run
    async fn abandon(&self, execution_id: &Uuid, error: &WorkflowError) {
        let stored = match self.repository.get(execution_id).await {
            Ok(Some(stored)) if !stored.status.is_terminal() => stored,
            Ok(_) => return,
            Err(e) => {
                error!(execution_id = %execution_id, error = %e, "Could not reload abandoned execution");
                return;
            }
        };

        let mut execution = stored;
        let traces = execution.traces.clone();
        let tokens_used = execution.tokens_used;
        if let Err(e) = execution.fail(ExecutionErrorPayload::from(error), traces, tokens_used) {
            error!(execution_id = %execution_id, error = %e, "Could not fail abandoned execution");
            return;
        }

        match self.repository.update(execution).await {
            Ok(_) => {
                warn!(execution_id = %execution_id, error = %error, "Workflow execution abandoned");
                record_execution(ExecutionStatus::Failed.as_str(), false);
            }
            Err(e) => {
                error!(execution_id = %execution_id, error = %e, "Could not persist abandoned execution");
            }
        }
    }
}
