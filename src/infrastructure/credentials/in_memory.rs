//! In-memory credential store

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::credentials::{CredentialProviderKey, CredentialResolver, ResolvedCredential};
use crate::domain::DomainError;

/// A stored credential and its ownership
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// Owner of the credential; `None` makes it available to every owner
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,

    #[serde(default)]
    pub revoked: bool,

    #[serde(flatten)]
    pub credential: ResolvedCredential,
}

impl CredentialRecord {
    pub fn new(owner_id: impl Into<String>, credential: ResolvedCredential) -> Self {
        Self {
            owner_id: Some(owner_id.into()),
            revoked: false,
            credential,
        }
    }

    pub fn shared(credential: ResolvedCredential) -> Self {
        Self {
            owner_id: None,
            revoked: false,
            credential,
        }
    }

    pub fn revoked(mut self) -> Self {
        self.revoked = true;
        self
    }

    fn is_active_for(&self, owner_id: &str) -> bool {
        !self.revoked
            && self.credential.has_secret()
            && self.owner_id.as_deref().is_none_or(|o| o == owner_id)
    }
}

/// Resolver over a fixed list of credential records.
///
/// Picks the most recently rotated active credential per provider.
#[derive(Debug, Default)]
pub struct StaticCredentialResolver {
    records: Vec<CredentialRecord>,
}

impl StaticCredentialResolver {
    pub fn new(records: Vec<CredentialRecord>) -> Self {
        Self { records }
    }

    pub fn with_record(mut self, record: CredentialRecord) -> Self {
        self.records.push(record);
        self
    }

    /// Parse a JSON array of credential records
    pub fn from_json(json: &str) -> Result<Self, DomainError> {
        let records: Vec<CredentialRecord> = serde_json::from_str(json).map_err(|e| {
            DomainError::configuration(format!("Invalid credentials document: {}", e))
        })?;
        Ok(Self::new(records))
    }
}

#[async_trait]
impl CredentialResolver for StaticCredentialResolver {
    async fn resolve_active_credentials(
        &self,
        owner_id: &str,
        providers: &[CredentialProviderKey],
    ) -> Result<HashMap<CredentialProviderKey, ResolvedCredential>, DomainError> {
        let mut resolved: HashMap<CredentialProviderKey, ResolvedCredential> = HashMap::new();

        for record in self.records.iter().filter(|r| r.is_active_for(owner_id)) {
            let credential = &record.credential;
            if !providers.contains(&credential.provider()) {
                continue;
            }

            let newer = match resolved.get(&credential.provider()) {
                Some(current) => credential.last_rotated_at() > current.last_rotated_at(),
                None => true,
            };

            if newer {
                resolved.insert(credential.provider(), credential.clone());
            }
        }

        Ok(resolved)
    }
}
