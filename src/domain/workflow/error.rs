//! Workflow error types

use thiserror::Error;

use crate::domain::DomainError;

/// Errors that can occur while running a workflow
#[derive(Debug, Clone, Error, PartialEq)]
pub enum WorkflowError {
    #[error("Execution not found: {0}")]
    ExecutionNotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Duplicate step order {order}: '{first}' and '{second}'")]
    DuplicateStepOrder {
        order: i32,
        first: String,
        second: String,
    },

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Step '{step}' failed: {source}")]
    StepExecution {
        step_id: String,
        step: String,
        #[source]
        source: DomainError,
    },

    #[error("Execution cancelled: {0}")]
    Cancelled(String),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl WorkflowError {
    pub fn execution_not_found(id: impl Into<String>) -> Self {
        Self::ExecutionNotFound(id.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn duplicate_step_order(
        order: i32,
        first: impl Into<String>,
        second: impl Into<String>,
    ) -> Self {
        Self::DuplicateStepOrder {
            order,
            first: first.into(),
            second: second.into(),
        }
    }

    pub fn invalid_transition(from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn step_execution(
        step_id: impl Into<String>,
        step: impl Into<String>,
        source: DomainError,
    ) -> Self {
        Self::StepExecution {
            step_id: step_id.into(),
            step: step.into(),
            source,
        }
    }

    pub fn cancelled(id: impl Into<String>) -> Self {
        Self::Cancelled(id.into())
    }

    /// Message persisted on a failed execution
    pub fn message(&self) -> String {
        match self {
            // Aggregate failures already name the step
            Self::StepExecution {
                source: source @ DomainError::AggregateFailure { .. },
                ..
            } => source.to_string(),
            other => other.to_string(),
        }
    }

    /// Warnings the failing step collected before it stopped
    pub fn warnings(&self) -> &[String] {
        match self {
            Self::StepExecution { source, .. } | Self::Domain(source) => source.warnings(),
            _ => &[],
        }
    }

    /// Id and name of the step that raised the error, if any
    pub fn step(&self) -> Option<(&str, &str)> {
        match self {
            Self::StepExecution { step_id, step, .. } => Some((step_id, step)),
            _ => None,
        }
    }
}
