use std::collections::HashMap;
use std::fmt::Debug;

use async_trait::async_trait;

use super::{CredentialProviderKey, ResolvedCredential};
use crate::domain::DomainError;

/// Capability exposed by the credential store.
///
/// Returns only providers that currently have an active (non-revoked)
/// credential for the owner, preferring the most recently rotated one.
/// Providers without one are simply absent from the returned map.
#[async_trait]
pub trait CredentialResolver: Send + Sync + Debug {
    async fn resolve_active_credentials(
        &self,
        owner_id: &str,
        providers: &[CredentialProviderKey],
    ) -> Result<HashMap<CredentialProviderKey, ResolvedCredential>, DomainError>;
}
