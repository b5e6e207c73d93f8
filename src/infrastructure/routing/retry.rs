use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{debug, warn};

use crate::domain::credentials::ResolvedCredential;
use crate::domain::llm::{
    ModelConfig, PromptRequest, ProviderInvocationResult, ProviderInvoker, RetryPolicy,
};
use crate::domain::DomainError;
use crate::infrastructure::observability::{
    record_llm_request, record_llm_retry, LlmRequestMetricParams,
};

/// Upper bound of the random delay added to every backoff
pub const DEFAULT_JITTER_MS: u64 = 200;

/// Runs one model through its retry policy.
///
/// Never returns an error: exhausted attempts become a failed result so the
/// dispatcher can keep going with other models.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    jitter_ms: u64,
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryExecutor {
    pub fn new() -> Self {
        Self {
            jitter_ms: DEFAULT_JITTER_MS,
        }
    }

    pub fn with_jitter_ms(mut self, jitter_ms: u64) -> Self {
        self.jitter_ms = jitter_ms;
        self
    }

    pub async fn execute(
        &self,
        invoker: &dyn ProviderInvoker,
        request: &PromptRequest,
        model: &ModelConfig,
        policy: &RetryPolicy,
        credential: Option<&ResolvedCredential>,
    ) -> ProviderInvocationResult {
        let max_attempts = policy.effective_attempts();
        let started = Instant::now();
        let mut warnings = Vec::new();
        let mut failed_attempts = 0;
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            let attempt_started = Instant::now();

            let error = match self.attempt(invoker, request, model, credential).await {
                Ok(result) if result.success => {
                    let mut result = result.with_retries(failed_attempts);
                    warnings.append(&mut result.warnings);
                    result.warnings = warnings;

                    let result = annotate(result, model);
                    record(&result, started.elapsed());
                    return result;
                }
                Ok(result) => DomainError::provider(
                    model.provider.as_str(),
                    result.error.unwrap_or_else(|| "Provider reported failure".to_string()),
                ),
                Err(e) => e,
            };

            failed_attempts += 1;
            last_error = failure_message(&error);
            warnings.push(format!(
                "Attempt {} failed after {}ms: {}",
                attempt,
                attempt_started.elapsed().as_millis(),
                last_error
            ));

            if !error.is_retryable() {
                debug!(
                    provider = %model.provider,
                    model = %model.model,
                    error = %error,
                    "Error is not retryable"
                );
                break;
            }

            if attempt < max_attempts {
                let jitter = if self.jitter_ms > 0 {
                    rand::thread_rng().gen_range(0..self.jitter_ms)
                } else {
                    0
                };
                let delay = policy.delay_for_attempt(attempt, jitter);

                warn!(
                    provider = %model.provider,
                    model = %model.model,
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %last_error,
                    "Model call failed, retrying"
                );
                record_llm_retry(model.provider.as_str(), &model.model);

                tokio::time::sleep(delay).await;
            }
        }

        warn!(
            provider = %model.provider,
            model = %model.model,
            attempts = failed_attempts,
            error = %last_error,
            "Model call failed"
        );

        let result = ProviderInvocationResult::failure(model.provider, &model.model, last_error)
            .with_retries(failed_attempts.saturating_sub(1))
            .with_warnings(warnings)
            .with_latency_ms(started.elapsed().as_millis() as u64);

        let result = annotate(result, model);
        record(&result, started.elapsed());
        result
    }

    async fn attempt(
        &self,
        invoker: &dyn ProviderInvoker,
        request: &PromptRequest,
        model: &ModelConfig,
        credential: Option<&ResolvedCredential>,
    ) -> Result<ProviderInvocationResult, DomainError> {
        match model.timeout_ms {
            Some(timeout_ms) => {
                tokio::time::timeout(
                    Duration::from_millis(timeout_ms),
                    invoker.invoke(request, model, credential),
                )
                .await
                .map_err(|_| {
                    DomainError::provider(
                        model.provider.as_str(),
                        format!("Request timed out after {}ms", timeout_ms),
                    )
                })?
            }
            None => invoker.invoke(request, model, credential).await,
        }
    }
}

/// Message of an error without the variant prefix
pub fn failure_message(error: &DomainError) -> String {
    match error {
        DomainError::Provider { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

fn annotate(mut result: ProviderInvocationResult, model: &ModelConfig) -> ProviderInvocationResult {
    if let Some(ref id) = model.id {
        result = result.with_metadata("modelId", id.as_str());
    }
    if let Some(ref label) = model.label {
        result = result.with_metadata("modelLabel", label.as_str());
    }
    result
}

fn record(result: &ProviderInvocationResult, duration: Duration) {
    record_llm_request(LlmRequestMetricParams {
        provider: result.provider.as_str(),
        model: &result.model,
        duration,
        success: result.success,
        input_tokens: result.usage.map(|u| u.prompt_tokens),
        output_tokens: result.usage.map(|u| u.completion_tokens),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::llm::mock::{MockOutcome, MockProviderInvoker};
    use crate::domain::llm::ProviderKind;
    use async_trait::async_trait;

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts).with_base_delay(1).with_max_delay(5)
    }

    fn model() -> ModelConfig {
        ModelConfig::new(ProviderKind::OpenAi, "gpt-4o").with_id("primary")
    }

    #[tokio::test]
    async fn test_success_after_retry_keeps_attempt_warning() {
        let invoker = MockProviderInvoker::new(ProviderKind::OpenAi).with_outcomes(
            "gpt-4o",
            vec![MockOutcome::error("HTTP 500: boom"), MockOutcome::success("ok", 10)],
        );

        let result = RetryExecutor::new()
            .with_jitter_ms(0)
            .execute(&invoker, &PromptRequest::new("Hi"), &model(), &fast_policy(2), None)
            .await;

        assert!(result.success);
        assert_eq!(result.output_text, "ok");
        assert_eq!(result.retries, 1);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].starts_with("Attempt 1 failed"));
        assert!(result.warnings[0].contains("HTTP 500: boom"));
        assert_eq!(result.metadata.get("modelId"), Some(&serde_json::json!("primary")));
        assert_eq!(invoker.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_attempts_return_failed_result() {
        let invoker = MockProviderInvoker::new(ProviderKind::OpenAi)
            .with_outcomes("gpt-4o", vec![MockOutcome::error("HTTP 503: unavailable")]);

        let result = RetryExecutor::new()
            .execute(&invoker, &PromptRequest::new("Hi"), &model(), &fast_policy(3), None)
            .await;

        assert!(!result.success);
        assert_eq!(result.retries, 2);
        assert_eq!(result.error.as_deref(), Some("HTTP 503: unavailable"));
        assert_eq!(result.warnings.len(), 3);
        assert!(result.warnings[2].starts_with("Attempt 3 failed"));
        assert_eq!(invoker.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_zero_attempts_is_clamped_to_one() {
        let invoker = MockProviderInvoker::new(ProviderKind::OpenAi)
            .with_outcomes("gpt-4o", vec![MockOutcome::error("nope")]);

        let result = RetryExecutor::new()
            .execute(&invoker, &PromptRequest::new("Hi"), &model(), &fast_policy(0), None)
            .await;

        assert!(!result.success);
        assert_eq!(result.retries, 0);
        assert_eq!(invoker.calls().len(), 1);
    }

    #[derive(Debug, Default)]
    struct MisconfiguredInvoker {
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl ProviderInvoker for MisconfiguredInvoker {
        async fn invoke(
            &self,
            _request: &PromptRequest,
            _model: &ModelConfig,
            _credential: Option<&ResolvedCredential>,
        ) -> Result<ProviderInvocationResult, DomainError> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Err(DomainError::configuration("Azure OpenAI endpoint is not configured"))
        }

        fn provider(&self) -> ProviderKind {
            ProviderKind::Azure
        }
    }

    #[tokio::test]
    async fn test_configuration_error_is_not_retried() {
        let invoker = MisconfiguredInvoker::default();
        let model = ModelConfig::new(ProviderKind::Azure, "gpt-4o");

        let result = RetryExecutor::new()
            .execute(&invoker, &PromptRequest::new("Hi"), &model, &fast_policy(3), None)
            .await;

        assert!(!result.success);
        assert_eq!(invoker.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert!(result.error.unwrap().contains("endpoint is not configured"));
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failed_attempt() {
        let invoker = MockProviderInvoker::new(ProviderKind::OpenAi)
            .with_outcomes("gpt-4o", vec![MockOutcome::success("late", 1)])
            .with_delay(Duration::from_millis(200));
        let model = model().with_timeout_ms(10);

        let result = RetryExecutor::new()
            .execute(&invoker, &PromptRequest::new("Hi"), &model, &fast_policy(1), None)
            .await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("timed out after 10ms"));
    }
}
