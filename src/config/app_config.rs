use serde::Deserialize;

use crate::domain::llm::{ProviderKind, RetryPolicy};
use crate::infrastructure::llm::{
    DEFAULT_ANTHROPIC_BASE_URL, DEFAULT_GOOGLE_BASE_URL, DEFAULT_MAX_SEGMENTS,
    DEFAULT_OPENAI_BASE_URL,
};

/// Application configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Engine-wide policy applied to every prompt step
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSettings {
    /// Upper bound for `max_tokens`; also used when a model sets none
    #[serde(default = "default_max_completion_tokens")]
    pub max_completion_tokens: Option<u32>,

    #[serde(default)]
    pub min_completion_tokens: Option<u32>,

    #[serde(default = "default_allowed_providers")]
    pub allowed_providers: Vec<ProviderKind>,

    #[serde(default = "default_max_segments")]
    pub max_continuation_segments: u32,

    /// Retry policy for models that do not configure one
    #[serde(default)]
    pub default_retry: RetryPolicy,

    /// Allow preview runs to substitute simulated output on auth failures
    #[serde(default = "default_true")]
    pub simulated_fallback: bool,

    /// Generated text above this many bytes is offloaded from traces
    #[serde(default)]
    pub offload_threshold_bytes: Option<usize>,
}

/// Provider endpoints and HTTP settings
#[derive(Debug, Clone, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_anthropic_base_url")]
    pub anthropic_base_url: String,
    #[serde(default = "default_google_base_url")]
    pub google_base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_completion_tokens() -> Option<u32> {
    Some(4096)
}

fn default_allowed_providers() -> Vec<ProviderKind> {
    ProviderKind::ALL.to_vec()
}

fn default_max_segments() -> u32 {
    DEFAULT_MAX_SEGMENTS
}

fn default_true() -> bool {
    true
}

fn default_openai_base_url() -> String {
    DEFAULT_OPENAI_BASE_URL.to_string()
}

fn default_anthropic_base_url() -> String {
    DEFAULT_ANTHROPIC_BASE_URL.to_string()
}

fn default_google_base_url() -> String {
    DEFAULT_GOOGLE_BASE_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_completion_tokens: default_max_completion_tokens(),
            min_completion_tokens: None,
            allowed_providers: default_allowed_providers(),
            max_continuation_segments: default_max_segments(),
            default_retry: RetryPolicy::default(),
            simulated_fallback: true,
            offload_threshold_bytes: None,
        }
    }
}

impl EngineSettings {
    pub fn is_provider_allowed(&self, provider: ProviderKind) -> bool {
        self.allowed_providers.contains(&provider)
    }

    pub fn with_allowed_providers(mut self, providers: Vec<ProviderKind>) -> Self {
        self.allowed_providers = providers;
        self
    }

    pub fn with_default_retry(mut self, retry: RetryPolicy) -> Self {
        self.default_retry = retry;
        self
    }

    pub fn with_completion_window(mut self, min: Option<u32>, max: Option<u32>) -> Self {
        self.min_completion_tokens = min;
        self.max_completion_tokens = max;
        self
    }

    pub fn with_offload_threshold(mut self, bytes: usize) -> Self {
        self.offload_threshold_bytes = Some(bytes);
        self
    }

    pub fn with_simulated_fallback(mut self, enabled: bool) -> Self {
        self.simulated_fallback = enabled;
        self
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            openai_base_url: default_openai_base_url(),
            anthropic_base_url: default_anthropic_base_url(),
            google_base_url: default_google_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("PROMPTFLOW")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("engine.allowed_providers"),
            )
            .build()?;

        config.try_deserialize()
    }
}
