//! Model, retry and routing configuration for prompt steps

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ProviderKind;

/// Requested shape of the generated output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    #[default]
    Text,
    JsonObject,
}

/// Generation parameters forwarded to the provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

impl GenerationParameters {
    /// Clamp `max_tokens` into the configured completion window
    pub fn clamp_max_tokens(&mut self, min: Option<u32>, max: Option<u32>) {
        if let Some(tokens) = self.max_tokens {
            let mut clamped = tokens;
            if let Some(max) = max {
                clamped = clamped.min(max);
            }
            if let Some(min) = min {
                clamped = clamped.max(min);
            }
            self.max_tokens = Some(clamped);
        } else if let Some(max) = max {
            self.max_tokens = Some(max);
        }
    }
}

/// Retry policy for a single model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    2
}

fn default_base_delay_ms() -> u64 {
    750
}

fn default_max_delay_ms() -> u64 {
    5000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    pub fn with_base_delay(mut self, ms: u64) -> Self {
        self.base_delay_ms = ms;
        self
    }

    pub fn with_max_delay(mut self, ms: u64) -> Self {
        self.max_delay_ms = ms;
        self
    }

    /// Attempts actually performed; never below one
    pub fn effective_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay before the retry that follows failed attempt `attempt` (1-indexed)
    pub fn delay_for_attempt(&self, attempt: u32, jitter_ms: u64) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let backoff = self.base_delay_ms.saturating_mul(1u64 << exponent);
        let delay_ms = backoff.saturating_add(jitter_ms).min(self.max_delay_ms);

        Duration::from_millis(delay_ms)
    }
}

/// Configuration of one model endpoint inside a prompt step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    pub provider: ProviderKind,

    /// Provider model name; empty means the provider default
    #[serde(default)]
    pub model: String,

    #[serde(default)]
    pub parameters: GenerationParameters,

    /// Unset means the engine-wide default policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,

    #[serde(default)]
    pub disabled: bool,

    /// Per-attempt timeout in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl ModelConfig {
    pub fn new(provider: ProviderKind, model: impl Into<String>) -> Self {
        Self {
            id: None,
            label: None,
            provider,
            model: model.into(),
            parameters: GenerationParameters::default(),
            retry: None,
            disabled: false,
            timeout_ms: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_parameters(mut self, parameters: GenerationParameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Policy of this model, or `fallback` when none is configured
    pub fn retry_policy(&self, fallback: &RetryPolicy) -> RetryPolicy {
        self.retry.clone().unwrap_or_else(|| fallback.clone())
    }

    pub fn with_disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Identifier used for preferred ordering and logs
    pub fn display_id(&self) -> String {
        self.id
            .clone()
            .unwrap_or_else(|| format!("{}:{}", self.provider, self.model))
    }

    /// Fill in the provider default model name when omitted
    pub fn normalized(mut self) -> Self {
        if self.model.trim().is_empty() {
            self.model = self.provider.default_model().to_string();
        }
        self
    }
}

/// How a prompt is spread across the configured models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RoutingMode {
    Parallel,
    #[default]
    Fallback,
}

/// What fallback routing does after a model's outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnErrorBehavior {
    Abort,
    Continue,
}

/// Routing policy of a prompt step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingPolicy {
    #[serde(default)]
    pub mode: RoutingMode,

    /// Fallback mode only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_error: Option<OnErrorBehavior>,

    /// Parallel mode only; defaults to the number of models
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,

    /// Model ids moved to the front, in this order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preferred_order: Vec<String>,
}

impl RoutingPolicy {
    pub fn parallel() -> Self {
        Self {
            mode: RoutingMode::Parallel,
            ..Default::default()
        }
    }

    pub fn fallback() -> Self {
        Self::default()
    }

    pub fn with_on_error(mut self, on_error: OnErrorBehavior) -> Self {
        self.on_error = Some(on_error);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    pub fn with_preferred_order(mut self, ids: Vec<String>) -> Self {
        self.preferred_order = ids;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 2);
        assert_eq!(policy.base_delay_ms, 750);
        assert_eq!(policy.max_delay_ms, 5000);
    }

    #[test]
    fn test_retry_delay_calculation() {
        let policy = RetryPolicy::new(5).with_base_delay(100).with_max_delay(1000);

        assert_eq!(policy.delay_for_attempt(1, 0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2, 0), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3, 50), Duration::from_millis(450));
        assert_eq!(policy.delay_for_attempt(4, 0), Duration::from_millis(800));
        assert_eq!(policy.delay_for_attempt(5, 0), Duration::from_millis(1000));
    }

    #[test]
    fn test_zero_attempts_runs_once() {
        assert_eq!(RetryPolicy::new(0).effective_attempts(), 1);
    }

    #[test]
    fn test_model_config_normalized_uses_default_model() {
        let model = ModelConfig::new(ProviderKind::Anthropic, "").normalized();
        assert_eq!(model.model, "claude-3-5-sonnet-latest");
        assert_eq!(model.display_id(), "anthropic:claude-3-5-sonnet-latest");
    }

    #[test]
    fn test_clamp_max_tokens() {
        let mut params = GenerationParameters {
            max_tokens: Some(50_000),
            ..Default::default()
        };
        params.clamp_max_tokens(Some(16), Some(4096));
        assert_eq!(params.max_tokens, Some(4096));

        let mut params = GenerationParameters {
            max_tokens: Some(4),
            ..Default::default()
        };
        params.clamp_max_tokens(Some(16), Some(4096));
        assert_eq!(params.max_tokens, Some(16));

        let mut params = GenerationParameters::default();
        params.clamp_max_tokens(None, None);
        assert_eq!(params.max_tokens, None);
    }

    #[test]
    fn test_model_config_deserialization() {
        let json = serde_json::json!({
            "id": "primary",
            "provider": "openai",
            "model": "gpt-4o",
            "parameters": {"temperature": 0.2, "response_format": "json_object"},
            "retry": {"max_attempts": 3}
        });

        let model: ModelConfig = serde_json::from_value(json).unwrap();
        assert_eq!(model.id.as_deref(), Some("primary"));
        assert_eq!(model.parameters.response_format, Some(ResponseFormat::JsonObject));
        let retry = model.retry_policy(&RetryPolicy::new(5));
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.base_delay_ms, 750);

        let bare = ModelConfig::new(ProviderKind::Google, "");
        assert_eq!(bare.retry_policy(&RetryPolicy::new(5)).max_attempts, 5);
        assert!(!model.disabled);
    }

    #[test]
    fn test_routing_policy_deserialization() {
        let json = serde_json::json!({
            "mode": "parallel",
            "concurrency": 2,
            "preferred_order": ["b", "a"]
        });

        let policy: RoutingPolicy = serde_json::from_value(json).unwrap();
        assert_eq!(policy.mode, RoutingMode::Parallel);
        assert_eq!(policy.concurrency, Some(2));
        assert_eq!(policy.preferred_order, vec!["b", "a"]);
        assert_eq!(policy.on_error, None);
    }
}
