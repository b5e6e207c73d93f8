//! In-memory output offloader

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{DomainError, OffloadedOutput, OutputOffloader};

const DEFAULT_PREVIEW_CHARS: usize = 200;
const TEXT_MIME_TYPE: &str = "text/plain";

/// Stored copy of an offloaded text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredOutput {
    pub owner_id: String,
    pub execution_id: Uuid,
    pub content: String,
}

/// Moves generated text above a byte threshold into an in-memory blob map
#[derive(Debug, Clone)]
pub struct InMemoryOutputOffloader {
    threshold_bytes: usize,
    preview_chars: usize,
    blobs: Arc<RwLock<HashMap<String, StoredOutput>>>,
}

impl InMemoryOutputOffloader {
    pub fn new(threshold_bytes: usize) -> Self {
        Self {
            threshold_bytes,
            preview_chars: DEFAULT_PREVIEW_CHARS,
            blobs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn with_preview_chars(mut self, preview_chars: usize) -> Self {
        self.preview_chars = preview_chars;
        self
    }

    pub async fn get(&self, id: &str) -> Option<StoredOutput> {
        self.blobs.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }

    fn preview(&self, text: &str) -> String {
        let mut preview: String = text.chars().take(self.preview_chars).collect();
        if preview.len() < text.len() {
            preview.push_str("...");
        }
        preview
    }
}

#[async_trait]
impl OutputOffloader for InMemoryOutputOffloader {
    async fn offload(
        &self,
        text: &str,
        owner_id: &str,
        execution_id: &Uuid,
    ) -> Result<Option<OffloadedOutput>, DomainError> {
        if text.len() <= self.threshold_bytes {
            return Ok(None);
        }

        let id = Uuid::new_v4().to_string();
        self.blobs.write().await.insert(
            id.clone(),
            StoredOutput {
                owner_id: owner_id.to_string(),
                execution_id: *execution_id,
                content: text.to_string(),
            },
        );

        debug!(
            blob_id = %id,
            execution_id = %execution_id,
            size = text.len(),
            "Offloaded generated text"
        );

        Ok(Some(OffloadedOutput {
            id,
            size: text.len(),
            mime_type: TEXT_MIME_TYPE.to_string(),
            preview: self.preview(text),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_small_text_stays_inline() {
        let offloader = InMemoryOutputOffloader::new(16);

        let result = offloader
            .offload("short", "owner-1", &Uuid::new_v4())
            .await
            .unwrap();

        assert!(result.is_none());
        assert!(offloader.is_empty().await);
    }

    #[tokio::test]
    async fn test_large_text_is_stored() {
        let offloader = InMemoryOutputOffloader::new(8).with_preview_chars(4);
        let execution_id = Uuid::new_v4();

        let offloaded = offloader
            .offload("a long generated answer", "owner-1", &execution_id)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(offloaded.size, 23);
        assert_eq!(offloaded.mime_type, "text/plain");
        assert_eq!(offloaded.preview, "a lo...");

        let stored = offloader.get(&offloaded.id).await.unwrap();
        assert_eq!(stored.content, "a long generated answer");
        assert_eq!(stored.execution_id, execution_id);
        assert_eq!(stored.owner_id, "owner-1");
    }
}
