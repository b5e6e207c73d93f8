//! Per-run credential cache

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::credentials::{CredentialProviderKey, CredentialResolver, ResolvedCredential};

/// Credentials resolved for one run, scoped to its owner.
///
/// The lock is held across the whole resolve-if-missing path, so concurrent
/// callers never trigger a second external lookup for the same provider.
/// Providers without an active credential are remembered as absent.
#[derive(Debug)]
pub struct CredentialCache {
    resolver: Arc<dyn CredentialResolver>,
    owner_id: String,
    entries: Mutex<HashMap<CredentialProviderKey, Option<ResolvedCredential>>>,
}

impl CredentialCache {
    pub fn new(resolver: Arc<dyn CredentialResolver>, owner_id: impl Into<String>) -> Self {
        Self {
            resolver,
            owner_id: owner_id.into(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Return active credentials for `providers`, resolving only the ones not
    /// seen yet in this run. Absent providers are missing from the result.
    pub async fn resolve(
        &self,
        providers: &[CredentialProviderKey],
    ) -> HashMap<CredentialProviderKey, ResolvedCredential> {
        let mut entries = self.entries.lock().await;

        let mut missing: Vec<CredentialProviderKey> = providers
            .iter()
            .copied()
            .filter(|p| !entries.contains_key(p))
            .collect();
        missing.sort();
        missing.dedup();

        if !missing.is_empty() {
            debug!(
                owner_id = %self.owner_id,
                providers = ?missing,
                "Resolving credentials"
            );

            match self
                .resolver
                .resolve_active_credentials(&self.owner_id, &missing)
                .await
            {
                Ok(mut resolved) => {
                    for provider in missing {
                        entries.insert(provider, resolved.remove(&provider));
                    }
                }
                Err(e) => {
                    // Not cached: a later step may retry the lookup
                    warn!(
                        owner_id = %self.owner_id,
                        error = %e,
                        "Credential resolution failed, using process defaults"
                    );
                }
            }
        }

        providers
            .iter()
            .filter_map(|p| {
                entries
                    .get(p)
                    .and_then(|c| c.clone())
                    .map(|c| (*p, c))
            })
            .collect()
    }

    /// Cached credential for one provider, without resolving
    pub async fn get(&self, provider: CredentialProviderKey) -> Option<ResolvedCredential> {
        self.entries.lock().await.get(&provider).cloned().flatten()
    }

    /// Number of providers looked up so far (present or absent)
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}
