//! Execution repository trait

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::execution::WorkflowExecution;
use crate::domain::DomainError;

/// One page of executions, newest first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPage {
    pub items: Vec<WorkflowExecution>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

impl ExecutionPage {
    pub fn has_more(&self) -> bool {
        self.offset + self.items.len() < self.total
    }
}

/// Repository trait for workflow execution records
#[async_trait]
pub trait ExecutionRepository: Send + Sync + std::fmt::Debug {
    /// Persist a new execution
    async fn create(&self, execution: WorkflowExecution) -> Result<WorkflowExecution, DomainError>;

    /// Replace an existing execution
    async fn update(&self, execution: WorkflowExecution) -> Result<WorkflowExecution, DomainError>;

    /// Get an execution by ID
    async fn get(&self, id: &Uuid) -> Result<Option<WorkflowExecution>, DomainError>;

    /// List executions of a workflow, newest first
    async fn list_by_workflow(
        &self,
        workflow_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<ExecutionPage, DomainError>;
}
