use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::http_client::{error_for_status, HttpClientTrait};
use super::simulated::{missing_key_warning, simulated_result};
use crate::domain::credentials::{metadata_keys, ResolvedCredential};
use crate::domain::llm::{
    FinishReason, Message, MessageRole, ModelConfig, PromptRequest, ProviderInvocationResult,
    ProviderInvoker, ProviderKind, TokenUsage,
};
use crate::domain::DomainError;
use crate::infrastructure::credentials::ProcessDefaults;

pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Anthropic messages API invoker
#[derive(Debug)]
pub struct AnthropicInvoker<C: HttpClientTrait> {
    client: C,
    defaults: ProcessDefaults,
    base_url: String,
}

impl<C: HttpClientTrait> AnthropicInvoker<C> {
    pub fn new(client: C, defaults: ProcessDefaults) -> Self {
        Self {
            client,
            defaults,
            base_url: DEFAULT_ANTHROPIC_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }
}

fn build_request(model: &str, request: &PromptRequest, config: &ModelConfig) -> Value {
    let (system, messages) = split_system_messages(&request.messages());
    let params = &config.parameters;

    let mut body = json!({
        "model": model,
        "messages": messages,
        "max_tokens": params.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
    });

    if let Some(system_content) = system {
        body["system"] = json!(system_content);
    }

    if let Some(temp) = params.temperature {
        body["temperature"] = json!(temp);
    }

    if let Some(top_p) = params.top_p {
        body["top_p"] = json!(top_p);
    }

    body
}

fn split_system_messages(messages: &[Message]) -> (Option<String>, Vec<AnthropicMessage>) {
    let mut system_content = String::new();
    let mut other_messages = Vec::new();

    for msg in messages {
        if msg.role == MessageRole::System {
            if !system_content.is_empty() {
                system_content.push('\n');
            }
            system_content.push_str(&msg.content);
        } else {
            other_messages.push(AnthropicMessage {
                role: msg.role.as_str(),
                content: msg.content.clone(),
            });
        }
    }

    let system = if system_content.is_empty() {
        None
    } else {
        Some(system_content)
    };

    (system, other_messages)
}

#[async_trait]
impl<C: HttpClientTrait> ProviderInvoker for AnthropicInvoker<C> {
    async fn invoke(
        &self,
        request: &PromptRequest,
        model: &ModelConfig,
        credential: Option<&ResolvedCredential>,
    ) -> Result<ProviderInvocationResult, DomainError> {
        let call = self.defaults.resolve(ProviderKind::Anthropic, credential);
        let Some(secret) = call.secret() else {
            return Ok(simulated_result(request, model, missing_key_warning("anthropic")));
        };

        // A model pinned on the credential overrides the step configuration
        let model_name = call
            .metadata_value(metadata_keys::MODEL)
            .unwrap_or(model.model.as_str());
        let version = call
            .metadata_value(metadata_keys::API_VERSION)
            .unwrap_or(ANTHROPIC_VERSION);

        let headers = vec![
            ("x-api-key", secret),
            ("anthropic-version", version),
            ("Content-Type", "application/json"),
        ];
        let body = build_request(model_name, request, model);

        let started = Instant::now();
        let response = self.client.post_json(&self.messages_url(), headers, &body).await?;
        let response = error_for_status("anthropic", response)?;
        let raw = response.body.clone();

        let parsed: AnthropicResponse = serde_json::from_value(response.body).map_err(|e| {
            DomainError::provider("anthropic", format!("Failed to parse response: {}", e))
        })?;

        let text = parsed
            .content
            .into_iter()
            .filter_map(|block| {
                if block.content_type == "text" {
                    block.text
                } else {
                    None
                }
            })
            .collect::<Vec<_>>()
            .join("");

        let mut result = ProviderInvocationResult::success(ProviderKind::Anthropic, model_name, text)
            .with_finish_reason(
                parsed
                    .stop_reason
                    .as_deref()
                    .and_then(FinishReason::from_provider),
            )
            .with_latency_ms(started.elapsed().as_millis() as u64)
            .with_request_id(parsed.id.or(response.request_id))
            .with_raw(raw);

        if let Some(usage) = parsed.usage {
            result = result.with_usage(TokenUsage::new(usage.input_tokens, usage.output_tokens));
        }

        Ok(result)
    }

    fn provider(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }
}

// Anthropic API types

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    id: Option<String>,
    #[serde(default)]
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::credentials::CredentialProviderKey;
    use crate::domain::llm::GenerationParameters;
    use crate::infrastructure::llm::http_client::mock::MockHttpClient;
    use std::sync::Arc;

    const TEST_URL: &str = "https://api.anthropic.com/v1/messages";

    fn response() -> Value {
        json!({
            "id": "msg_123",
            "type": "message",
            "role": "assistant",
            "content": [
                {"type": "text", "text": "Hello "},
                {"type": "tool_use", "id": "t1"},
                {"type": "text", "text": "there!"}
            ],
            "model": "claude-3-5-sonnet-latest",
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 10, "output_tokens": 15}
        })
    }

    #[tokio::test]
    async fn test_anthropic_invoke() {
        let client = Arc::new(MockHttpClient::new().with_response(TEST_URL, response()));
        let invoker = AnthropicInvoker::new(client.clone(), ProcessDefaults::new());

        let credential = ResolvedCredential::new(CredentialProviderKey::Anthropic, "sk-ant");
        let request = PromptRequest::new("Hi").with_instructions("You are terse");
        let model = ModelConfig::new(ProviderKind::Anthropic, "claude-3-5-sonnet-latest");

        let result = invoker.invoke(&request, &model, Some(&credential)).await.unwrap();

        assert_eq!(result.output_text, "Hello there!");
        assert_eq!(result.tokens_used(), 25);
        assert_eq!(result.finish_reason, Some(FinishReason::Stop));
        assert_eq!(result.metadata.get("requestId"), Some(&json!("msg_123")));

        let sent = &client.requests()[0];
        assert_eq!(sent.header("x-api-key"), Some("sk-ant"));
        assert_eq!(sent.header("anthropic-version"), Some(ANTHROPIC_VERSION));
        assert_eq!(sent.body["system"], "You are terse");
        assert_eq!(sent.body["max_tokens"], DEFAULT_MAX_TOKENS);
        assert_eq!(sent.body["messages"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_anthropic_credential_overrides_model_and_version() {
        let client = Arc::new(MockHttpClient::new().with_response(TEST_URL, response()));
        let invoker = AnthropicInvoker::new(client.clone(), ProcessDefaults::new());

        let credential = ResolvedCredential::new(CredentialProviderKey::Anthropic, "sk-ant")
            .with_metadata(metadata_keys::MODEL, "claude-3-opus-latest")
            .with_metadata(metadata_keys::API_VERSION, "2024-01-01");
        let model = ModelConfig::new(ProviderKind::Anthropic, "claude-3-5-sonnet-latest")
            .with_parameters(GenerationParameters {
                max_tokens: Some(300),
                ..Default::default()
            });

        let result = invoker
            .invoke(&PromptRequest::new("Hi"), &model, Some(&credential))
            .await
            .unwrap();

        assert_eq!(result.model, "claude-3-opus-latest");
        let sent = &client.requests()[0];
        assert_eq!(sent.body["model"], "claude-3-opus-latest");
        assert_eq!(sent.body["max_tokens"], 300);
        assert_eq!(sent.header("anthropic-version"), Some("2024-01-01"));
    }

    #[tokio::test]
    async fn test_anthropic_max_tokens_stop_reason() {
        let mut body = response();
        body["stop_reason"] = json!("max_tokens");
        let client = MockHttpClient::new().with_response(TEST_URL, body);
        let invoker = AnthropicInvoker::new(
            client,
            ProcessDefaults::new().with_secret(ProviderKind::Anthropic, "env"),
        );

        let result = invoker
            .invoke(
                &PromptRequest::new("Hi"),
                &ModelConfig::new(ProviderKind::Anthropic, "claude-3-5-sonnet-latest"),
                None,
            )
            .await
            .unwrap();

        assert_eq!(result.finish_reason, Some(FinishReason::Length));
    }

    #[tokio::test]
    async fn test_anthropic_error_status() {
        let client = MockHttpClient::new().with_status(
            TEST_URL,
            529,
            json!({"type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}}),
        );
        let invoker = AnthropicInvoker::new(
            client,
            ProcessDefaults::new().with_secret(ProviderKind::Anthropic, "env"),
        );

        let err = invoker
            .invoke(
                &PromptRequest::new("Hi"),
                &ModelConfig::new(ProviderKind::Anthropic, "claude-3-5-sonnet-latest"),
                None,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::Provider { status: Some(529), .. }));
    }
}
