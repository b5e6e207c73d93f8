use std::collections::HashMap;
use std::env;

use crate::domain::credentials::{metadata_keys, ResolvedCredential};
use crate::domain::llm::ProviderKind;

/// Environment variable mappings for one provider
#[derive(Debug, Clone)]
pub struct EnvMapping {
    /// Checked in order; the first non-empty value wins
    pub api_key_vars: Vec<String>,
    /// Metadata key -> environment variable
    pub additional_vars: HashMap<String, String>,
}

impl EnvMapping {
    pub fn new(api_key_var: impl Into<String>) -> Self {
        Self {
            api_key_vars: vec![api_key_var.into()],
            additional_vars: HashMap::new(),
        }
    }

    pub fn or_key(mut self, api_key_var: impl Into<String>) -> Self {
        self.api_key_vars.push(api_key_var.into());
        self
    }

    pub fn with_var(mut self, param_name: impl Into<String>, env_var: impl Into<String>) -> Self {
        self.additional_vars.insert(param_name.into(), env_var.into());
        self
    }
}

/// Process-level default for one provider
#[derive(Debug, Clone, Default)]
pub struct ProcessDefault {
    pub secret: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// Where the secret of a call came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Stored,
    ProcessDefault,
    None,
}

/// Secret and settings used for a single provider call
#[derive(Debug, Clone)]
pub struct CallCredential {
    pub secret: Option<String>,
    pub metadata: HashMap<String, String>,
    pub source: CredentialSource,
}

impl CallCredential {
    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref()
    }

    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// Provider defaults taken from the process environment.
///
/// Used whenever a run has no stored credential for a provider.
#[derive(Debug, Clone, Default)]
pub struct ProcessDefaults {
    defaults: HashMap<ProviderKind, ProcessDefault>,
}

impl ProcessDefaults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Standard mappings for every supported provider
    pub fn default_mappings() -> Vec<(ProviderKind, EnvMapping)> {
        vec![
            (ProviderKind::OpenAi, EnvMapping::new("OPENAI_API_KEY")
                .with_var(metadata_keys::ORGANIZATION, "OPENAI_ORGANIZATION")),
            (ProviderKind::Azure, EnvMapping::new("AZURE_OPENAI_API_KEY")
                .with_var(metadata_keys::ENDPOINT, "AZURE_OPENAI_ENDPOINT")
                .with_var(metadata_keys::DEPLOYMENT, "AZURE_OPENAI_DEPLOYMENT")
                .with_var(metadata_keys::API_VERSION, "AZURE_OPENAI_API_VERSION")),
            (ProviderKind::Anthropic, EnvMapping::new("ANTHROPIC_API_KEY")),
            (ProviderKind::Google, EnvMapping::new("GOOGLE_API_KEY").or_key("GEMINI_API_KEY")),
            (ProviderKind::Custom, EnvMapping::new("CUSTOM_LLM_API_KEY")
                .with_var(metadata_keys::BASE_URL, "CUSTOM_LLM_BASE_URL")
                .with_var(metadata_keys::MODEL, "CUSTOM_LLM_MODEL")),
        ]
    }

    /// Read the standard mappings from the environment
    pub fn from_env() -> Self {
        Self::from_mappings(Self::default_mappings(), |var| env::var(var).ok())
    }

    /// Build defaults from mappings and a variable lookup
    pub fn from_mappings<F>(mappings: Vec<(ProviderKind, EnvMapping)>, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut defaults = HashMap::new();

        for (provider, mapping) in mappings {
            let secret = mapping
                .api_key_vars
                .iter()
                .filter_map(|var| lookup(var.as_str()))
                .find(|v| !v.trim().is_empty());

            let metadata: HashMap<String, String> = mapping
                .additional_vars
                .iter()
                .filter_map(|(key, var)| lookup(var.as_str()).map(|v| (key.clone(), v)))
                .collect();

            if secret.is_some() || !metadata.is_empty() {
                defaults.insert(provider, ProcessDefault { secret, metadata });
            }
        }

        Self { defaults }
    }

    pub fn with_secret(mut self, provider: ProviderKind, secret: impl Into<String>) -> Self {
        self.defaults.entry(provider).or_default().secret = Some(secret.into());
        self
    }

    pub fn with_metadata(
        mut self,
        provider: ProviderKind,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.defaults
            .entry(provider)
            .or_default()
            .metadata
            .insert(key.into(), value.into());
        self
    }

    pub fn get(&self, provider: ProviderKind) -> Option<&ProcessDefault> {
        self.defaults.get(&provider)
    }

    pub fn has_secret(&self, provider: ProviderKind) -> bool {
        self.get(provider)
            .and_then(|d| d.secret.as_deref())
            .is_some_and(|s| !s.trim().is_empty())
    }

    /// Combine a stored credential with the process default.
    ///
    /// The stored secret wins; metadata missing from the stored credential is
    /// taken from the process default.
    pub fn resolve(
        &self,
        provider: ProviderKind,
        credential: Option<&ResolvedCredential>,
    ) -> CallCredential {
        let fallback = self.get(provider).cloned().unwrap_or_default();

        match credential.filter(|c| c.has_secret()) {
            Some(stored) => {
                let mut metadata = fallback.metadata;
                metadata.extend(
                    stored
                        .metadata()
                        .iter()
                        .filter(|(_, v)| !v.trim().is_empty())
                        .map(|(k, v)| (k.clone(), v.clone())),
                );

                CallCredential {
                    secret: Some(stored.secret().to_string()),
                    metadata,
                    source: CredentialSource::Stored,
                }
            }
            None => {
                let secret = fallback.secret.filter(|s| !s.trim().is_empty());
                let source = if secret.is_some() {
                    CredentialSource::ProcessDefault
                } else {
                    CredentialSource::None
                };

                CallCredential {
                    secret,
                    metadata: fallback.metadata,
                    source,
                }
            }
        }
    }
}
