use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::http_client::{error_for_status, HttpClientTrait, HttpResponse};
use super::simulated::{missing_key_warning, simulated_result};
use crate::domain::credentials::{metadata_keys, ResolvedCredential};
use crate::domain::llm::{
    FinishReason, GenerationParameters, Message, ModelConfig, PromptRequest,
    ProviderInvocationResult, ProviderInvoker, ProviderKind, ResponseFormat, TokenUsage,
};
use crate::domain::DomainError;
use crate::infrastructure::credentials::ProcessDefaults;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";

/// Continuation segments used when none are configured
pub const DEFAULT_MAX_SEGMENTS: u32 = 5;

/// Hard upper bound for continuation segments
pub const MAX_SEGMENTS_CAP: u32 = 10;

const CONTINUE_INSTRUCTION: &str =
    "Continue exactly where you stopped. Do not repeat any earlier text.";

/// OpenAI chat completions invoker
#[derive(Debug)]
pub struct OpenAiInvoker<C: HttpClientTrait> {
    client: C,
    defaults: ProcessDefaults,
    base_url: String,
    max_segments: u32,
}

impl<C: HttpClientTrait> OpenAiInvoker<C> {
    pub fn new(client: C, defaults: ProcessDefaults) -> Self {
        Self {
            client,
            defaults,
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            max_segments: DEFAULT_MAX_SEGMENTS,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Number of requests allowed while the output keeps getting cut off
    pub fn with_max_segments(mut self, max_segments: u32) -> Self {
        self.max_segments = max_segments.clamp(1, MAX_SEGMENTS_CAP);
        self
    }

    fn chat_completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }
}

#[async_trait]
impl<C: HttpClientTrait> ProviderInvoker for OpenAiInvoker<C> {
    async fn invoke(
        &self,
        request: &PromptRequest,
        model: &ModelConfig,
        credential: Option<&ResolvedCredential>,
    ) -> Result<ProviderInvocationResult, DomainError> {
        let call = self.defaults.resolve(ProviderKind::OpenAi, credential);
        let Some(secret) = call.secret() else {
            return Ok(simulated_result(request, model, missing_key_warning("openai")));
        };

        let auth_header = format!("Bearer {}", secret);
        let mut headers = vec![
            ("Authorization", auth_header.as_str()),
            ("Content-Type", "application/json"),
        ];
        if let Some(organization) = call.metadata_value(metadata_keys::ORGANIZATION) {
            headers.push(("OpenAI-Organization", organization));
        }

        let url = self.chat_completions_url();
        let started = Instant::now();
        let mut messages = request.messages();
        let mut text = String::new();
        let mut usage = TokenUsage::default();
        let mut segments = 0;

        let completion = loop {
            segments += 1;

            let body = chat_body(Some(&model.model), &messages, &model.parameters);
            let response = self.client.post_json(&url, headers.clone(), &body).await?;
            let completion = parse_chat_completion("openai", error_for_status("openai", response)?)?;

            text.push_str(&completion.text);
            if let Some(ref segment_usage) = completion.usage {
                usage = usage.add(segment_usage);
            }

            if completion.finish_reason != Some(FinishReason::Length) || segments >= self.max_segments {
                break completion;
            }

            tracing::debug!(
                model = %model.model,
                segment = segments,
                "Output truncated, requesting continuation"
            );
            messages.push(Message::assistant(&completion.text));
            messages.push(Message::user(CONTINUE_INSTRUCTION));
        };

        let mut result = ProviderInvocationResult::success(ProviderKind::OpenAi, &model.model, text)
            .with_usage(usage)
            .with_finish_reason(completion.finish_reason)
            .with_latency_ms(started.elapsed().as_millis() as u64)
            .with_request_id(completion.id)
            .with_raw(completion.raw)
            .with_metadata("segments", segments);

        if completion.finish_reason == Some(FinishReason::Length) {
            result = result.with_warning(format!(
                "Output still truncated after {} segment(s)",
                segments
            ));
        }

        Ok(result)
    }

    fn provider(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }
}

/// Body of an OpenAI-compatible chat completion request
pub(crate) fn chat_body(
    model: Option<&str>,
    messages: &[Message],
    params: &GenerationParameters,
) -> Value {
    let messages: Vec<ChatMessage> = messages.iter().map(ChatMessage::from_domain).collect();

    let mut body = json!({ "messages": messages });

    if let Some(model) = model {
        body["model"] = json!(model);
    }

    if let Some(temp) = params.temperature {
        body["temperature"] = json!(temp);
    }

    if let Some(max_tokens) = params.max_tokens {
        body["max_tokens"] = json!(max_tokens);
    }

    if let Some(top_p) = params.top_p {
        body["top_p"] = json!(top_p);
    }

    if let Some(presence_penalty) = params.presence_penalty {
        body["presence_penalty"] = json!(presence_penalty);
    }

    if let Some(frequency_penalty) = params.frequency_penalty {
        body["frequency_penalty"] = json!(frequency_penalty);
    }

    if let Some(seed) = params.seed {
        body["seed"] = json!(seed);
    }

    match params.response_format {
        Some(ResponseFormat::JsonObject) => {
            body["response_format"] = json!({"type": "json_object"});
        }
        Some(ResponseFormat::Text) => {
            body["response_format"] = json!({"type": "text"});
        }
        None => {}
    }

    body
}

/// One parsed chat completion
#[derive(Debug, Clone)]
pub(crate) struct ChatCompletion {
    pub id: Option<String>,
    pub text: String,
    pub usage: Option<TokenUsage>,
    pub finish_reason: Option<FinishReason>,
    pub raw: Value,
}

/// Parse an OpenAI-compatible chat completion response
pub(crate) fn parse_chat_completion(
    provider: &str,
    response: HttpResponse,
) -> Result<ChatCompletion, DomainError> {
    let parsed: ChatResponse = serde_json::from_value(response.body.clone()).map_err(|e| {
        DomainError::provider(provider, format!("Failed to parse response: {}", e))
    })?;

    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| DomainError::provider(provider, "No choices in response"))?;

    Ok(ChatCompletion {
        id: parsed.id.or(response.request_id),
        text: choice.message.and_then(|m| m.content).unwrap_or_default(),
        usage: parsed
            .usage
            .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens)),
        finish_reason: choice
            .finish_reason
            .as_deref()
            .and_then(FinishReason::from_provider),
        raw: response.body,
    })
}

// OpenAI API types

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

impl ChatMessage {
    fn from_domain(message: &Message) -> Self {
        Self {
            role: message.role.as_str(),
            content: message.content.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    id: Option<String>,
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatResponseMessage>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}
