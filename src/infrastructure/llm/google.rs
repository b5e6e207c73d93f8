use std::time::Instant;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::http_client::{error_for_status, HttpClientTrait};
use super::simulated::{missing_key_warning, simulated_result};
use crate::domain::credentials::{metadata_keys, ResolvedCredential};
use crate::domain::llm::{
    FinishReason, ModelConfig, PromptRequest, ProviderInvocationResult, ProviderInvoker,
    ProviderKind, ResponseFormat, TokenUsage,
};
use crate::domain::DomainError;
use crate::infrastructure::credentials::ProcessDefaults;

pub const DEFAULT_GOOGLE_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Google Gemini `generateContent` invoker
#[derive(Debug)]
pub struct GoogleInvoker<C: HttpClientTrait> {
    client: C,
    defaults: ProcessDefaults,
    base_url: String,
}

impl<C: HttpClientTrait> GoogleInvoker<C> {
    pub fn new(client: C, defaults: ProcessDefaults) -> Self {
        Self {
            client,
            defaults,
            base_url: DEFAULT_GOOGLE_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn generate_url(&self, model: &str) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, model)
    }
}

fn build_request(request: &PromptRequest, config: &ModelConfig) -> Value {
    let mut body = json!({
        "contents": [{
            "role": "user",
            "parts": [{"text": request.prompt}]
        }],
    });

    if let Some(ref instructions) = request.instructions {
        body["systemInstruction"] = json!({"parts": [{"text": instructions}]});
    }

    let params = &config.parameters;
    let mut generation = json!({});

    if let Some(temp) = params.temperature {
        generation["temperature"] = json!(temp);
    }

    if let Some(top_p) = params.top_p {
        generation["topP"] = json!(top_p);
    }

    if let Some(max_tokens) = params.max_tokens {
        generation["maxOutputTokens"] = json!(max_tokens);
    }

    if let Some(presence_penalty) = params.presence_penalty {
        generation["presencePenalty"] = json!(presence_penalty);
    }

    if let Some(frequency_penalty) = params.frequency_penalty {
        generation["frequencyPenalty"] = json!(frequency_penalty);
    }

    if let Some(seed) = params.seed {
        generation["seed"] = json!(seed);
    }

    if params.response_format == Some(ResponseFormat::JsonObject) {
        generation["responseMimeType"] = json!("application/json");
    }

    if generation.as_object().is_some_and(|g| !g.is_empty()) {
        body["generationConfig"] = generation;
    }

    body
}

#[async_trait]
impl<C: HttpClientTrait> ProviderInvoker for GoogleInvoker<C> {
    async fn invoke(
        &self,
        request: &PromptRequest,
        model: &ModelConfig,
        credential: Option<&ResolvedCredential>,
    ) -> Result<ProviderInvocationResult, DomainError> {
        let call = self.defaults.resolve(ProviderKind::Google, credential);
        let Some(secret) = call.secret() else {
            return Ok(simulated_result(request, model, missing_key_warning("google")));
        };

        let model_name = call
            .metadata_value(metadata_keys::MODEL)
            .unwrap_or(model.model.as_str());

        let headers = vec![("x-goog-api-key", secret), ("Content-Type", "application/json")];
        let body = build_request(request, model);

        let started = Instant::now();
        let response = self
            .client
            .post_json(&self.generate_url(model_name), headers, &body)
            .await?;
        let response = error_for_status("google", response)?;
        let raw = response.body.clone();

        let parsed: GeminiResponse = serde_json::from_value(response.body).map_err(|e| {
            DomainError::provider("google", format!("Failed to parse response: {}", e))
        })?;

        let candidate = parsed
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| DomainError::provider("google", "No candidates in response"))?;

        let text = candidate
            .content
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        let mut result = ProviderInvocationResult::success(ProviderKind::Google, model_name, text)
            .with_finish_reason(
                candidate
                    .finish_reason
                    .as_deref()
                    .and_then(FinishReason::from_provider),
            )
            .with_latency_ms(started.elapsed().as_millis() as u64)
            .with_request_id(parsed.response_id.or(response.request_id))
            .with_raw(raw);

        if let Some(usage) = parsed.usage_metadata {
            result = result.with_usage(TokenUsage::new(
                usage.prompt_token_count,
                usage.candidates_token_count,
            ));
        }

        Ok(result)
    }

    fn provider(&self) -> ProviderKind {
        ProviderKind::Google
    }
}

// Gemini API types

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
    response_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}
