//! Canonical outcome of one model invocation

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ProviderKind;

/// Prefix of every text produced without calling a provider
pub const SIMULATED_OUTPUT_MARKER: &str = "[Simulated output]";

/// Token usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    /// Sum two usage records, e.g. across continuation segments
    pub fn add(&self, other: &TokenUsage) -> TokenUsage {
        TokenUsage {
            prompt_tokens: self.prompt_tokens + other.prompt_tokens,
            completion_tokens: self.completion_tokens + other.completion_tokens,
            total_tokens: self.total_tokens + other.total_tokens,
        }
    }
}

/// Reason why generation stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    ToolCalls,
    Error,
}

impl FinishReason {
    /// Map a provider-specific finish reason string
    pub fn from_provider(reason: &str) -> Option<Self> {
        match reason.to_ascii_lowercase().as_str() {
            "stop" | "end_turn" | "stop_sequence" | "complete" => Some(Self::Stop),
            "length" | "max_tokens" => Some(Self::Length),
            "content_filter" | "safety" | "recitation" => Some(Self::ContentFilter),
            "tool_calls" | "tool_use" | "function_call" => Some(Self::ToolCalls),
            "" => None,
            _ => Some(Self::Stop),
        }
    }
}

/// Normalized result of a provider call (or of all retries of one model)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderInvocationResult {
    pub provider: ProviderKind,
    pub model: String,
    pub success: bool,
    #[serde(default)]
    pub output_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    #[serde(default)]
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl ProviderInvocationResult {
    pub fn success(provider: ProviderKind, model: &str, output_text: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.to_string(),
            success: true,
            output_text: output_text.into(),
            usage: None,
            latency_ms: 0,
            finish_reason: Some(FinishReason::Stop),
            warnings: Vec::new(),
            error: None,
            retries: 0,
            raw: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn failure(provider: ProviderKind, model: &str, error: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.to_string(),
            success: false,
            output_text: String::new(),
            usage: None,
            latency_ms: 0,
            finish_reason: Some(FinishReason::Error),
            warnings: Vec::new(),
            error: Some(error.into()),
            retries: 0,
            raw: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    pub fn with_finish_reason(mut self, reason: Option<FinishReason>) -> Self {
        self.finish_reason = reason;
        self
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings.extend(warnings);
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_raw(mut self, raw: Value) -> Self {
        self.raw = Some(raw);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Attach the provider correlation id, if any
    pub fn with_request_id(self, request_id: Option<String>) -> Self {
        match request_id {
            Some(id) if !id.is_empty() => self.with_metadata("requestId", id),
            _ => self,
        }
    }

    /// Total tokens of this result; missing usage counts as zero
    pub fn tokens_used(&self) -> u64 {
        self.usage.map(|u| u.total_tokens).unwrap_or(0)
    }

    pub fn is_simulated(&self) -> bool {
        self.metadata
            .get("simulated")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Successful result carrying generated text
    pub fn has_output(&self) -> bool {
        self.success && !self.output_text.trim().is_empty()
    }
}

/// Whether an error message looks like a rejected or missing credential
pub fn is_authentication_error(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    [
        "401",
        "403",
        "unauthorized",
        "invalid api key",
        "incorrect api key",
        "invalid_api_key",
        "authentication",
        "permission",
    ]
    .iter()
    .any(|needle| lower.contains(needle))
}
