use std::fmt::{self, Debug};
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ModelConfig, PromptRequest, ProviderInvocationResult};
use crate::domain::credentials::{CredentialProviderKey, ResolvedCredential};
use crate::domain::DomainError;

/// Supported text-generation providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Azure,
    Anthropic,
    Google,
    Custom,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 5] = [
        ProviderKind::OpenAi,
        ProviderKind::Azure,
        ProviderKind::Anthropic,
        ProviderKind::Google,
        ProviderKind::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Azure => "azure",
            Self::Anthropic => "anthropic",
            Self::Google => "google",
            Self::Custom => "custom",
        }
    }

    /// Model used when a model configuration omits the model name
    pub fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-4o-mini",
            Self::Azure => "gpt-4o-mini",
            Self::Anthropic => "claude-3-5-sonnet-latest",
            Self::Google => "gemini-1.5-flash",
            Self::Custom => "default",
        }
    }

    /// Key under which the credential store keeps secrets for this provider.
    ///
    /// Custom endpoints never use a stored credential.
    pub fn credential_key(&self) -> Option<CredentialProviderKey> {
        match self {
            Self::OpenAi => Some(CredentialProviderKey::OpenAi),
            Self::Azure => Some(CredentialProviderKey::AzureOpenAi),
            Self::Anthropic => Some(CredentialProviderKey::Anthropic),
            Self::Google => Some(CredentialProviderKey::Google),
            Self::Custom => None,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "azure" | "azure_openai" | "azure-openai" => Ok(Self::Azure),
            "anthropic" => Ok(Self::Anthropic),
            "google" | "gemini" => Ok(Self::Google),
            "custom" => Ok(Self::Custom),
            other => Err(DomainError::configuration(format!(
                "Unsupported provider '{}'",
                other
            ))),
        }
    }
}

/// Adapter that turns a canonical prompt request into one provider call
#[async_trait]
pub trait ProviderInvoker: Send + Sync + Debug {
    /// Perform a single call (no retries) and normalize the response.
    ///
    /// When no secret is available from `credential` or the process
    /// defaults, implementations return a successful simulated result.
    async fn invoke(
        &self,
        request: &PromptRequest,
        model: &ModelConfig,
        credential: Option<&ResolvedCredential>,
    ) -> Result<ProviderInvocationResult, DomainError>;

    fn provider(&self) -> ProviderKind;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use crate::domain::llm::TokenUsage;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Scripted outcome for one call
    #[derive(Debug, Clone)]
    pub enum MockOutcome {
        Success { text: String, tokens: u64 },
        Error(String),
    }

    impl MockOutcome {
        pub fn success(text: impl Into<String>, tokens: u64) -> Self {
            Self::Success {
                text: text.into(),
                tokens,
            }
        }

        pub fn error(message: impl Into<String>) -> Self {
            Self::Error(message.into())
        }
    }

    /// Invoker with per-model scripted outcomes.
    ///
    /// Each model consumes its script in order; the last outcome repeats.
    #[derive(Debug)]
    pub struct MockProviderInvoker {
        provider: ProviderKind,
        scripts: Mutex<HashMap<String, VecDeque<MockOutcome>>>,
        delay: Option<Duration>,
        calls: Mutex<Vec<String>>,
        prompts: Mutex<Vec<String>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl MockProviderInvoker {
        pub fn new(provider: ProviderKind) -> Self {
            Self {
                provider,
                scripts: Mutex::new(HashMap::new()),
                delay: None,
                calls: Mutex::new(Vec::new()),
                prompts: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }

        pub fn with_outcomes(self, model: impl Into<String>, outcomes: Vec<MockOutcome>) -> Self {
            self.scripts
                .lock()
                .unwrap()
                .insert(model.into(), outcomes.into_iter().collect());
            self
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        /// Model names in the order they were invoked
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        /// Prompts received, in invocation order
        pub fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }

        pub fn max_in_flight(&self) -> usize {
            self.max_in_flight.load(Ordering::SeqCst)
        }

        fn next_outcome(&self, model: &str) -> MockOutcome {
            let mut scripts = self.scripts.lock().unwrap();
            match scripts.get_mut(model) {
                Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
                Some(queue) => queue
                    .front()
                    .cloned()
                    .unwrap_or_else(|| MockOutcome::error("empty script")),
                None => MockOutcome::error(format!("No mock outcome for model '{}'", model)),
            }
        }
    }

    #[async_trait]
    impl ProviderInvoker for MockProviderInvoker {
        async fn invoke(
            &self,
            request: &PromptRequest,
            model: &ModelConfig,
            _credential: Option<&ResolvedCredential>,
        ) -> Result<ProviderInvocationResult, DomainError> {
            self.calls.lock().unwrap().push(model.model.clone());
            self.prompts.lock().unwrap().push(request.prompt.clone());

            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            match self.next_outcome(&model.model) {
                MockOutcome::Success { text, tokens } => Ok(ProviderInvocationResult::success(
                    self.provider,
                    &model.model,
                    text,
                )
                .with_usage(TokenUsage::new(tokens / 2, tokens - tokens / 2))),
                MockOutcome::Error(message) => {
                    Err(DomainError::provider(self.provider.as_str(), message))
                }
            }
        }

        fn provider(&self) -> ProviderKind {
            self.provider
        }
    }
}
