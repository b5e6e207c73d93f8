//! Workflow execution record and per-step traces

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::error::WorkflowError;
use crate::domain::offload::OffloadedOutput;

/// Lifecycle status of a workflow run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error stored on a failed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionErrorPayload {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_name: Option<String>,

    /// Warnings of the failing step, per-model failure summaries included
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl From<&WorkflowError> for ExecutionErrorPayload {
    fn from(error: &WorkflowError) -> Self {
        let (step_id, step_name) = match error.step() {
            Some((id, name)) => (Some(id.to_string()), Some(name.to_string())),
            None => (None, None),
        };

        Self {
            message: error.message(),
            step_id,
            step_name,
            warnings: error.warnings().to_vec(),
        }
    }
}

/// Trace entry recorded for every executed step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepTrace {
    pub step_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub step_type: String,
    pub order: i32,

    /// Snapshot of the step input
    pub input: Map<String, Value>,

    /// Raw output, with generated text replaced by a preview when offloaded
    #[serde(default)]
    pub output: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offloaded: Option<OffloadedOutput>,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub exports: Map<String, Value>,

    pub duration_ms: u64,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,

    #[serde(default)]
    pub tokens_used: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepTrace {
    pub fn new(
        step_id: impl Into<String>,
        name: impl Into<String>,
        step_type: impl Into<String>,
        order: i32,
        input: Map<String, Value>,
    ) -> Self {
        Self {
            step_id: step_id.into(),
            name: name.into(),
            step_type: step_type.into(),
            order,
            input,
            output: Value::Null,
            offloaded: None,
            exports: Map::new(),
            duration_ms: 0,
            warnings: Vec::new(),
            tokens_used: 0,
            error: None,
        }
    }

    pub fn with_output(mut self, output: Value) -> Self {
        self.output = output;
        self
    }

    pub fn with_offloaded(mut self, offloaded: Option<OffloadedOutput>) -> Self {
        self.offloaded = offloaded;
        self
    }

    pub fn with_exports(mut self, exports: Map<String, Value>) -> Self {
        self.exports = exports;
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }

    pub fn with_tokens_used(mut self, tokens: u64) -> Self {
        self.tokens_used = tokens;
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// A single run of a workflow, persisted through [`super::ExecutionRepository`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowExecution {
    pub id: Uuid,
    pub workflow_id: String,
    pub owner_id: String,
    pub status: ExecutionStatus,
    pub input: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionErrorPayload>,
    #[serde(default)]
    pub traces: Vec<StepTrace>,
    #[serde(default)]
    pub tokens_used: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowExecution {
    pub fn new(
        workflow_id: impl Into<String>,
        owner_id: impl Into<String>,
        input: Map<String, Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id: workflow_id.into(),
            owner_id: owner_id.into(),
            status: ExecutionStatus::Pending,
            input,
            output: None,
            error: None,
            traces: Vec::new(),
            tokens_used: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    fn transition(&mut self, allowed: &[ExecutionStatus], to: ExecutionStatus) -> Result<(), WorkflowError> {
        if !allowed.contains(&self.status) {
            return Err(WorkflowError::invalid_transition(self.status, to));
        }
        self.status = to;
        Ok(())
    }

    /// PENDING -> RUNNING
    pub fn start(&mut self) -> Result<(), WorkflowError> {
        self.transition(&[ExecutionStatus::Pending], ExecutionStatus::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// RUNNING -> COMPLETED
    pub fn complete(
        &mut self,
        output: Value,
        traces: Vec<StepTrace>,
        tokens_used: u64,
    ) -> Result<(), WorkflowError> {
        self.transition(&[ExecutionStatus::Running], ExecutionStatus::Completed)?;
        self.output = Some(output);
        self.traces = traces;
        self.tokens_used = tokens_used;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// PENDING | RUNNING -> FAILED
    pub fn fail(
        &mut self,
        error: ExecutionErrorPayload,
        traces: Vec<StepTrace>,
        tokens_used: u64,
    ) -> Result<(), WorkflowError> {
        self.transition(
            &[ExecutionStatus::Pending, ExecutionStatus::Running],
            ExecutionStatus::Failed,
        )?;
        self.error = Some(error);
        self.traces = traces;
        self.tokens_used = tokens_used;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Any non-terminal status -> CANCELLED
    pub fn cancel(&mut self) -> Result<(), WorkflowError> {
        self.transition(
            &[ExecutionStatus::Pending, ExecutionStatus::Running],
            ExecutionStatus::Cancelled,
        )?;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }
}
