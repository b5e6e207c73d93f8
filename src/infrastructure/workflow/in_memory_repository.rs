//! In-memory execution repository implementation

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::workflow::{ExecutionPage, ExecutionRepository, WorkflowExecution};
use crate::domain::DomainError;

/// In-memory implementation of ExecutionRepository
#[derive(Debug, Clone)]
pub struct InMemoryExecutionRepository {
    executions: Arc<RwLock<HashMap<Uuid, WorkflowExecution>>>,
}

impl InMemoryExecutionRepository {
    /// Create a new empty repository
    pub fn new() -> Self {
        Self {
            executions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Create a repository pre-populated with executions
    pub fn with_executions(executions: Vec<WorkflowExecution>) -> Self {
        let map: HashMap<Uuid, WorkflowExecution> =
            executions.into_iter().map(|e| (e.id, e)).collect();

        Self {
            executions: Arc::new(RwLock::new(map)),
        }
    }

    pub async fn len(&self) -> usize {
        self.executions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.executions.read().await.is_empty()
    }
}

impl Default for InMemoryExecutionRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutionRepository for InMemoryExecutionRepository {
    async fn create(&self, execution: WorkflowExecution) -> Result<WorkflowExecution, DomainError> {
        let mut executions = self.executions.write().await;

        if executions.contains_key(&execution.id) {
            return Err(DomainError::validation(format!(
                "Execution '{}' already exists",
                execution.id
            )));
        }

        executions.insert(execution.id, execution.clone());
        Ok(execution)
    }

    async fn update(&self, execution: WorkflowExecution) -> Result<WorkflowExecution, DomainError> {
        let mut executions = self.executions.write().await;

        if !executions.contains_key(&execution.id) {
            return Err(DomainError::not_found(format!(
                "Execution '{}' not found",
                execution.id
            )));
        }

        executions.insert(execution.id, execution.clone());
        Ok(execution)
    }

    async fn get(&self, id: &Uuid) -> Result<Option<WorkflowExecution>, DomainError> {
        let executions = self.executions.read().await;
        Ok(executions.get(id).cloned())
    }

    async fn list_by_workflow(
        &self,
        workflow_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<ExecutionPage, DomainError> {
        let executions = self.executions.read().await;

        let mut matching: Vec<&WorkflowExecution> = executions
            .values()
            .filter(|e| e.workflow_id == workflow_id)
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        let total = matching.len();
        let items = matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();

        Ok(ExecutionPage {
            items,
            total,
            limit,
            offset,
        })
    }
}
