use std::time::Instant;

use async_trait::async_trait;

use super::http_client::{error_for_status, HttpClientTrait};
use super::openai::{chat_body, parse_chat_completion};
use super::simulated::simulated_result;
use crate::domain::credentials::{metadata_keys, ResolvedCredential};
use crate::domain::llm::{
    ModelConfig, PromptRequest, ProviderInvocationResult, ProviderInvoker, ProviderKind,
};
use crate::domain::DomainError;
use crate::infrastructure::credentials::ProcessDefaults;

/// Invoker for a self-hosted OpenAI-compatible endpoint.
///
/// The endpoint never uses a stored credential: base URL, optional API key
/// and default model all come from the process configuration.
#[derive(Debug)]
pub struct CustomInvoker<C: HttpClientTrait> {
    client: C,
    defaults: ProcessDefaults,
}

impl<C: HttpClientTrait> CustomInvoker<C> {
    pub fn new(client: C, defaults: ProcessDefaults) -> Self {
        Self { client, defaults }
    }
}

#[async_trait]
impl<C: HttpClientTrait> ProviderInvoker for CustomInvoker<C> {
    async fn invoke(
        &self,
        request: &PromptRequest,
        model: &ModelConfig,
        credential: Option<&ResolvedCredential>,
    ) -> Result<ProviderInvocationResult, DomainError> {
        let call = self.defaults.resolve(ProviderKind::Custom, credential);

        let Some(base_url) = call.metadata_value(metadata_keys::BASE_URL) else {
            return Ok(simulated_result(
                request,
                model,
                "No base URL configured for custom provider; returned a simulated response without calling the provider",
            ));
        };

        let model_name = match model.model.as_str() {
            "" | "default" => call.metadata_value(metadata_keys::MODEL).unwrap_or("default"),
            name => name,
        };

        let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));
        let auth_header = call.secret().map(|s| format!("Bearer {}", s));
        let mut headers = vec![("Content-Type", "application/json")];
        if let Some(ref auth) = auth_header {
            headers.push(("Authorization", auth.as_str()));
        }

        let body = chat_body(Some(model_name), &request.messages(), &model.parameters);

        let started = Instant::now();
        let response = self.client.post_json(&url, headers, &body).await?;
        let completion = parse_chat_completion("custom", error_for_status("custom", response)?)?;

        let mut result =
            ProviderInvocationResult::success(ProviderKind::Custom, model_name, completion.text)
                .with_finish_reason(completion.finish_reason)
                .with_latency_ms(started.elapsed().as_millis() as u64)
                .with_request_id(completion.id)
                .with_raw(completion.raw);

        if let Some(usage) = completion.usage {
            result = result.with_usage(usage);
        }

        Ok(result)
    }

    fn provider(&self) -> ProviderKind {
        ProviderKind::Custom
    }
}
