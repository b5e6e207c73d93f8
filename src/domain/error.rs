use thiserror::Error;

/// Core domain errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DomainError {
    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Credential error: {message}")]
    Credential { message: String },

    #[error("Provider error: {provider} - {message}")]
    Provider {
        provider: String,
        message: String,
        status: Option<u16>,
    },

    #[error("Step '{step}' failed: all configured models failed. First error: {message}")]
    AggregateFailure {
        step: String,
        message: String,
        /// One `provider/model: error` entry per model
        failures: Vec<String>,
        /// Everything the step noted before giving up, failure summaries included
        warnings: Vec<String>,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DomainError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn credential(message: impl Into<String>) -> Self {
        Self::Credential {
            message: message.into(),
        }
    }

    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
            status: None,
        }
    }

    pub fn provider_status(
        provider: impl Into<String>,
        status: u16,
        message: impl Into<String>,
    ) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
            status: Some(status),
        }
    }

    pub fn aggregate_failure(
        step: impl Into<String>,
        message: impl Into<String>,
        failures: Vec<String>,
    ) -> Self {
        Self::AggregateFailure {
            step: step.into(),
            message: message.into(),
            failures,
            warnings: Vec::new(),
        }
    }

    /// Attach step warnings to an aggregate failure; other variants are unchanged
    pub fn with_warnings(mut self, extra: Vec<String>) -> Self {
        if let Self::AggregateFailure { ref mut warnings, .. } = self {
            warnings.extend(extra);
        }
        self
    }

    /// Warnings carried by the error
    pub fn warnings(&self) -> &[String] {
        match self {
            Self::AggregateFailure { warnings, .. } => warnings,
            _ => &[],
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether another attempt against the same model could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Provider { .. } | Self::Internal { .. })
    }
}
