use std::time::Instant;

use async_trait::async_trait;

use super::http_client::{error_for_status, HttpClientTrait};
use super::openai::{chat_body, parse_chat_completion};
use super::simulated::{missing_key_warning, simulated_result};
use crate::domain::credentials::{metadata_keys, ResolvedCredential};
use crate::domain::llm::{
    ModelConfig, PromptRequest, ProviderInvocationResult, ProviderInvoker, ProviderKind,
};
use crate::domain::DomainError;
use crate::infrastructure::credentials::ProcessDefaults;

pub const DEFAULT_AZURE_API_VERSION: &str = "2024-02-01";

/// Azure OpenAI chat completions invoker.
///
/// Endpoint, deployment and API version come from credential metadata,
/// falling back to the process defaults.
#[derive(Debug)]
pub struct AzureOpenAiInvoker<C: HttpClientTrait> {
    client: C,
    defaults: ProcessDefaults,
}

impl<C: HttpClientTrait> AzureOpenAiInvoker<C> {
    pub fn new(client: C, defaults: ProcessDefaults) -> Self {
        Self { client, defaults }
    }
}

fn build_url(endpoint: &str, deployment: &str, api_version: &str) -> String {
    format!(
        "{}/openai/deployments/{}/chat/completions?api-version={}",
        endpoint.trim_end_matches('/'),
        deployment,
        api_version
    )
}

#[async_trait]
impl<C: HttpClientTrait> ProviderInvoker for AzureOpenAiInvoker<C> {
    async fn invoke(
        &self,
        request: &PromptRequest,
        model: &ModelConfig,
        credential: Option<&ResolvedCredential>,
    ) -> Result<ProviderInvocationResult, DomainError> {
        let call = self.defaults.resolve(ProviderKind::Azure, credential);
        let Some(secret) = call.secret() else {
            return Ok(simulated_result(request, model, missing_key_warning("azure")));
        };

        let endpoint = call.metadata_value(metadata_keys::ENDPOINT).ok_or_else(|| {
            DomainError::configuration("Azure OpenAI endpoint is not configured")
        })?;
        let deployment = call
            .metadata_value(metadata_keys::DEPLOYMENT)
            .unwrap_or(model.model.as_str());
        let api_version = call
            .metadata_value(metadata_keys::API_VERSION)
            .unwrap_or(DEFAULT_AZURE_API_VERSION);

        let url = build_url(endpoint, deployment, api_version);
        let headers = vec![("api-key", secret), ("Content-Type", "application/json")];
        // The deployment selects the model
        let body = chat_body(None, &request.messages(), &model.parameters);

        let started = Instant::now();
        let response = self.client.post_json(&url, headers, &body).await?;
        let completion = parse_chat_completion("azure", error_for_status("azure", response)?)?;

        let mut result =
            ProviderInvocationResult::success(ProviderKind::Azure, &model.model, completion.text)
                .with_finish_reason(completion.finish_reason)
                .with_latency_ms(started.elapsed().as_millis() as u64)
                .with_request_id(completion.id)
                .with_raw(completion.raw)
                .with_metadata("deployment", deployment);

        if let Some(usage) = completion.usage {
            result = result.with_usage(usage);
        }

        Ok(result)
    }

    fn provider(&self) -> ProviderKind {
        ProviderKind::Azure
    }
}
