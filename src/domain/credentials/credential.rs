use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Well-known keys in a credential's metadata map
pub mod metadata_keys {
    pub const ORGANIZATION: &str = "organization";
    pub const ENDPOINT: &str = "endpoint";
    pub const DEPLOYMENT: &str = "deployment";
    pub const API_VERSION: &str = "api_version";
    pub const MODEL: &str = "model";
    pub const BASE_URL: &str = "base_url";
}

/// Provider key used by the external credential store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CredentialProviderKey {
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "azure_openai")]
    AzureOpenAi,
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "google")]
    Google,
}

impl CredentialProviderKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::AzureOpenAi => "azure_openai",
            Self::Anthropic => "anthropic",
            Self::Google => "google",
        }
    }
}

impl fmt::Display for CredentialProviderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decrypted, currently active credential handed over by the credential store.
///
/// Lives in memory for the duration of one execution and is never persisted.
#[derive(Clone, Serialize, Deserialize)]
pub struct ResolvedCredential {
    provider: CredentialProviderKey,
    #[serde(default)]
    label: String,
    secret: String,
    #[serde(default)]
    metadata: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_rotated_at: Option<DateTime<Utc>>,
}

impl ResolvedCredential {
    pub fn new(provider: CredentialProviderKey, secret: impl Into<String>) -> Self {
        Self {
            provider,
            label: String::new(),
            secret: secret.into(),
            metadata: HashMap::new(),
            last_rotated_at: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_last_rotated_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_rotated_at = Some(at);
        self
    }

    pub fn provider(&self) -> CredentialProviderKey {
        self.provider
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn has_secret(&self) -> bool {
        !self.secret.trim().is_empty()
    }

    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    /// Get a non-empty metadata value
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn last_rotated_at(&self) -> Option<DateTime<Utc>> {
        self.last_rotated_at
    }
}

impl fmt::Debug for ResolvedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedCredential")
            .field("provider", &self.provider)
            .field("label", &self.label)
            .field("secret", &"<redacted>")
            .field("metadata", &self.metadata)
            .field("last_rotated_at", &self.last_rotated_at)
            .finish()
    }
}
