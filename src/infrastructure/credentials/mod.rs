//! Credential resolution: per-run cache, process defaults and a static store

mod cache;
mod env_provider;
mod in_memory;

pub use cache::CredentialCache;
pub use env_provider::{
    CallCredential, CredentialSource, EnvMapping, ProcessDefault, ProcessDefaults,
};
pub use in_memory::{CredentialRecord, StaticCredentialResolver};
