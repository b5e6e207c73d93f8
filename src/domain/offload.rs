//! Large-output offload hook

use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::DomainError;

/// Reference left in a trace when generated text was moved out of line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OffloadedOutput {
    pub id: String,
    pub size: usize,
    pub mime_type: String,
    pub preview: String,
}

/// Optional post-processing hook for large generated text.
///
/// Returns `None` when the text stays inline.
#[async_trait]
pub trait OutputOffloader: Send + Sync + Debug {
    async fn offload(
        &self,
        text: &str,
        owner_id: &str,
        execution_id: &Uuid,
    ) -> Result<Option<OffloadedOutput>, DomainError>;
}
