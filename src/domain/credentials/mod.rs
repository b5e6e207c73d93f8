//! Credential domain - resolved provider secrets and the external resolution capability

mod credential;
mod resolver;

pub use credential::{metadata_keys, CredentialProviderKey, ResolvedCredential};
pub use resolver::CredentialResolver;

#[cfg(test)]
pub use resolver::mock;
