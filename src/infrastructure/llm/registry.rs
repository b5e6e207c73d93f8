use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::http_client::HttpClient;
use super::{AnthropicInvoker, AzureOpenAiInvoker, CustomInvoker, GoogleInvoker, OpenAiInvoker};
use crate::config::ProvidersConfig;
use crate::domain::llm::{ProviderInvoker, ProviderKind};
use crate::domain::DomainError;
use crate::infrastructure::credentials::ProcessDefaults;

/// Invokers keyed by provider
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    invokers: HashMap<ProviderKind, Arc<dyn ProviderInvoker>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the standard adapters over one shared reqwest client
    pub fn from_config(
        config: &ProvidersConfig,
        max_continuation_segments: u32,
        defaults: ProcessDefaults,
    ) -> Result<Self, DomainError> {
        let client = Arc::new(HttpClient::with_timeout(Duration::from_secs(
            config.request_timeout_secs,
        ))?);

        let registry = Self::new()
            .with_invoker(Arc::new(
                OpenAiInvoker::new(client.clone(), defaults.clone())
                    .with_base_url(&config.openai_base_url)
                    .with_max_segments(max_continuation_segments),
            ))
            .with_invoker(Arc::new(AzureOpenAiInvoker::new(
                client.clone(),
                defaults.clone(),
            )))
            .with_invoker(Arc::new(
                AnthropicInvoker::new(client.clone(), defaults.clone())
                    .with_base_url(&config.anthropic_base_url),
            ))
            .with_invoker(Arc::new(
                GoogleInvoker::new(client.clone(), defaults.clone())
                    .with_base_url(&config.google_base_url),
            ))
            .with_invoker(Arc::new(CustomInvoker::new(client, defaults)));

        Ok(registry)
    }

    /// Register `invoker` under the provider it reports, replacing any previous one
    pub fn with_invoker(mut self, invoker: Arc<dyn ProviderInvoker>) -> Self {
        self.invokers.insert(invoker.provider(), invoker);
        self
    }

    pub fn get(&self, provider: ProviderKind) -> Result<Arc<dyn ProviderInvoker>, DomainError> {
        self.invokers.get(&provider).cloned().ok_or_else(|| {
            DomainError::configuration(format!("No invoker registered for provider '{}'", provider))
        })
    }

    pub fn providers(&self) -> Vec<ProviderKind> {
        let mut providers: Vec<ProviderKind> = self.invokers.keys().copied().collect();
        providers.sort();
        providers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::llm::mock::MockProviderInvoker;

    #[test]
    fn test_from_config_registers_every_provider() {
        let registry =
            ProviderRegistry::from_config(&ProvidersConfig::default(), 5, ProcessDefaults::new())
                .unwrap();

        assert_eq!(registry.providers(), ProviderKind::ALL.to_vec());
        assert_eq!(
            registry.get(ProviderKind::Google).unwrap().provider(),
            ProviderKind::Google
        );
    }

    #[test]
    fn test_missing_invoker_is_configuration_error() {
        let registry = ProviderRegistry::new()
            .with_invoker(Arc::new(MockProviderInvoker::new(ProviderKind::OpenAi)));

        assert!(registry.get(ProviderKind::OpenAi).is_ok());
        assert!(matches!(
            registry.get(ProviderKind::Anthropic),
            Err(DomainError::Configuration { .. })
        ));
    }
}
