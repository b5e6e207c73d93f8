use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use futures::future::join_all;
use serde::Serialize;
use tracing::debug;

use super::retry::RetryExecutor;
use crate::domain::credentials::{CredentialProviderKey, ResolvedCredential};
use crate::domain::llm::{
    ModelConfig, OnErrorBehavior, PromptRequest, ProviderInvocationResult, RetryPolicy,
    RoutingMode, RoutingPolicy,
};
use crate::domain::DomainError;
use crate::infrastructure::llm::ProviderRegistry;

/// Results of one dispatch, in dispatch order
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchOutcome {
    pub results: Vec<ProviderInvocationResult>,
    pub aggregated_tokens: u64,
}

impl DispatchOutcome {
    fn new(results: Vec<ProviderInvocationResult>) -> Self {
        let aggregated_tokens = results.iter().map(|r| r.tokens_used()).sum();
        Self {
            results,
            aggregated_tokens,
        }
    }

    /// First successful result with non-empty text, in result order
    pub fn primary(&self) -> Option<&ProviderInvocationResult> {
        self.results.iter().find(|r| r.has_output())
    }

    pub fn failures(&self) -> impl Iterator<Item = &ProviderInvocationResult> {
        self.results.iter().filter(|r| !r.success)
    }
}

/// Sends one prompt to the configured models under a routing policy
#[derive(Debug, Clone)]
pub struct ModelDispatcher {
    registry: ProviderRegistry,
    retry: RetryExecutor,
    default_retry: RetryPolicy,
}

impl ModelDispatcher {
    pub fn new(registry: ProviderRegistry) -> Self {
        Self {
            registry,
            retry: RetryExecutor::new(),
            default_retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_executor(mut self, retry: RetryExecutor) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_default_retry(mut self, policy: RetryPolicy) -> Self {
        self.default_retry = policy;
        self
    }

    pub async fn dispatch(
        &self,
        request: &PromptRequest,
        models: &[ModelConfig],
        routing: &RoutingPolicy,
        credentials: &HashMap<CredentialProviderKey, ResolvedCredential>,
    ) -> Result<DispatchOutcome, DomainError> {
        let enabled: Vec<&ModelConfig> = models.iter().filter(|m| !m.disabled).collect();
        if enabled.is_empty() {
            return Err(DomainError::configuration(
                "No enabled models configured for prompt step",
            ));
        }

        for model in &enabled {
            self.registry.get(model.provider)?;
        }

        let ordered = order_models(enabled, &routing.preferred_order);

        debug!(
            mode = ?routing.mode,
            models = ordered.len(),
            "Dispatching prompt"
        );

        let results = match routing.mode {
            RoutingMode::Fallback => {
                self.dispatch_fallback(request, &ordered, routing.on_error, credentials)
                    .await
            }
            RoutingMode::Parallel => {
                let concurrency = routing.concurrency.unwrap_or(ordered.len());
                self.dispatch_parallel(request, &ordered, concurrency, credentials)
                    .await
            }
        };

        Ok(DispatchOutcome::new(results))
    }

    async fn dispatch_fallback(
        &self,
        request: &PromptRequest,
        models: &[&ModelConfig],
        on_error: Option<OnErrorBehavior>,
        credentials: &HashMap<CredentialProviderKey, ResolvedCredential>,
    ) -> Vec<ProviderInvocationResult> {
        let mut results = Vec::with_capacity(models.len());

        for model in models {
            let result = self.run_model(request, model, credentials).await;
            let success = result.success;
            results.push(result);

            let stop = match (success, on_error) {
                (true, Some(OnErrorBehavior::Continue)) => false,
                (true, _) => true,
                (false, Some(OnErrorBehavior::Abort)) => true,
                (false, _) => false,
            };

            if stop {
                break;
            }
        }

        results
    }

    async fn dispatch_parallel(
        &self,
        request: &PromptRequest,
        models: &[&ModelConfig],
        concurrency: usize,
        credentials: &HashMap<CredentialProviderKey, ResolvedCredential>,
    ) -> Vec<ProviderInvocationResult> {
        let queue: Mutex<VecDeque<(usize, &ModelConfig)>> =
            Mutex::new(models.iter().copied().enumerate().collect());
        let workers = concurrency.clamp(1, models.len().max(1));

        let worker_futures = (0..workers).map(|_| async {
            let mut completed = Vec::new();
            loop {
                let next = queue
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .pop_front();
                let Some((index, model)) = next else {
                    break;
                };
                completed.push((index, self.run_model(request, model, credentials).await));
            }
            completed
        });

        let mut indexed: Vec<(usize, ProviderInvocationResult)> =
            join_all(worker_futures).await.into_iter().flatten().collect();
        indexed.sort_by_key(|(index, _)| *index);

        indexed.into_iter().map(|(_, result)| result).collect()
    }

    async fn run_model(
        &self,
        request: &PromptRequest,
        model: &ModelConfig,
        credentials: &HashMap<CredentialProviderKey, ResolvedCredential>,
    ) -> ProviderInvocationResult {
        let invoker = match self.registry.get(model.provider) {
            Ok(invoker) => invoker,
            Err(e) => {
                return ProviderInvocationResult::failure(model.provider, &model.model, e.to_string())
            }
        };

        let credential = model
            .provider
            .credential_key()
            .and_then(|key| credentials.get(&key));
        let policy = model.retry_policy(&self.default_retry);

        self.retry
            .execute(invoker.as_ref(), request, model, &policy, credential)
            .await
    }
}

/// Move models whose id appears in `preferred` to the front, in that order.
/// Unlisted models keep their relative order.
pub fn order_models<'a>(models: Vec<&'a ModelConfig>, preferred: &[String]) -> Vec<&'a ModelConfig> {
    if preferred.is_empty() {
        return models;
    }

    let mut remaining = models;
    let mut ordered = Vec::with_capacity(remaining.len());

    for id in preferred {
        if let Some(pos) = remaining
            .iter()
            .position(|m| m.id.as_deref() == Some(id.as_str()) || m.display_id() == *id)
        {
            ordered.push(remaining.remove(pos));
        }
    }

    ordered.extend(remaining);
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::llm::mock::{MockOutcome, MockProviderInvoker};
    use crate::domain::llm::ProviderKind;
    use std::sync::Arc;
    use std::time::Duration;

    fn fast() -> RetryPolicy {
        RetryPolicy::new(1).with_base_delay(1).with_max_delay(2)
    }

    fn dispatcher(invokers: Vec<Arc<MockProviderInvoker>>) -> ModelDispatcher {
        let registry = invokers
            .into_iter()
            .fold(ProviderRegistry::new(), |registry, invoker| {
                registry.with_invoker(invoker)
            });
        ModelDispatcher::new(registry)
            .with_retry_executor(RetryExecutor::new().with_jitter_ms(0))
            .with_default_retry(fast())
    }

    fn model(provider: ProviderKind, name: &str, id: &str) -> ModelConfig {
        ModelConfig::new(provider, name).with_id(id)
    }

    #[tokio::test]
    async fn test_fallback_follows_preferred_order() {
        let invoker = Arc::new(
            MockProviderInvoker::new(ProviderKind::OpenAi)
                .with_outcomes("model-a", vec![MockOutcome::success("A", 5)])
                .with_outcomes("model-b", vec![MockOutcome::success("B", 5)]),
        );
        let models = vec![
            model(ProviderKind::OpenAi, "model-a", "A"),
            model(ProviderKind::OpenAi, "model-b", "B"),
        ];
        let routing = RoutingPolicy::fallback().with_preferred_order(vec!["B".into(), "A".into()]);

        let outcome = dispatcher(vec![invoker.clone()])
            .dispatch(&PromptRequest::new("Hi"), &models, &routing, &HashMap::new())
            .await
            .unwrap();

        assert_eq!(invoker.calls(), vec!["model-b".to_string()]);
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.primary().unwrap().output_text, "B");
    }

    #[tokio::test]
    async fn test_fallback_continues_past_failures_by_default() {
        let invoker = Arc::new(
            MockProviderInvoker::new(ProviderKind::OpenAi)
                .with_outcomes("a", vec![MockOutcome::error("HTTP 500: down")])
                .with_outcomes("b", vec![MockOutcome::success("from b", 4)])
                .with_outcomes("c", vec![MockOutcome::success("from c", 4)]),
        );
        let models = vec![
            model(ProviderKind::OpenAi, "a", "a"),
            model(ProviderKind::OpenAi, "b", "b"),
            model(ProviderKind::OpenAi, "c", "c"),
        ];

        let outcome = dispatcher(vec![invoker.clone()])
            .dispatch(&PromptRequest::new("Hi"), &models, &RoutingPolicy::fallback(), &HashMap::new())
            .await
            .unwrap();

        assert_eq!(invoker.calls(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(outcome.failures().count(), 1);
        assert_eq!(outcome.primary().unwrap().output_text, "from b");
    }

    #[tokio::test]
    async fn test_fallback_on_error_abort_and_continue() {
        let make = || {
            Arc::new(
                MockProviderInvoker::new(ProviderKind::OpenAi)
                    .with_outcomes("a", vec![MockOutcome::success("first", 2)])
                    .with_outcomes("b", vec![MockOutcome::error("boom")])
                    .with_outcomes("c", vec![MockOutcome::success("third", 2)]),
            )
        };
        let models = vec![
            model(ProviderKind::OpenAi, "b", "b"),
            model(ProviderKind::OpenAi, "a", "a"),
            model(ProviderKind::OpenAi, "c", "c"),
        ];

        let aborting = make();
        let outcome = dispatcher(vec![aborting.clone()])
            .dispatch(
                &PromptRequest::new("Hi"),
                &models,
                &RoutingPolicy::fallback().with_on_error(OnErrorBehavior::Abort),
                &HashMap::new(),
            )
            .await
            .unwrap();
        assert_eq!(aborting.calls(), vec!["b".to_string()]);
        assert!(outcome.primary().is_none());

        let continuing = make();
        let outcome = dispatcher(vec![continuing.clone()])
            .dispatch(
                &PromptRequest::new("Hi"),
                &models,
                &RoutingPolicy::fallback().with_on_error(OnErrorBehavior::Continue),
                &HashMap::new(),
            )
            .await
            .unwrap();
        assert_eq!(continuing.calls().len(), 3);
        assert_eq!(outcome.results.len(), 3);
        // First success in result order wins, not the most recent one
        assert_eq!(outcome.primary().unwrap().output_text, "first");
    }

    #[tokio::test]
    async fn test_parallel_aggregates_tokens_in_dispatch_order() {
        let openai = Arc::new(
            MockProviderInvoker::new(ProviderKind::OpenAi)
                .with_outcomes("gpt-4o", vec![MockOutcome::success("one", 32)])
                .with_delay(Duration::from_millis(30)),
        );
        let anthropic = Arc::new(
            MockProviderInvoker::new(ProviderKind::Anthropic)
                .with_outcomes("claude", vec![MockOutcome::success("two", 32)])
                .with_delay(Duration::from_millis(1)),
        );
        let google = Arc::new(
            MockProviderInvoker::new(ProviderKind::Google)
                .with_outcomes("gemini", vec![MockOutcome::success("three", 32)]),
        );
        let models = vec![
            model(ProviderKind::OpenAi, "gpt-4o", "1"),
            model(ProviderKind::Anthropic, "claude", "2"),
            model(ProviderKind::Google, "gemini", "3"),
        ];

        let outcome = dispatcher(vec![openai, anthropic, google])
            .dispatch(&PromptRequest::new("Hi"), &models, &RoutingPolicy::parallel(), &HashMap::new())
            .await
            .unwrap();

        assert_eq!(outcome.aggregated_tokens, 96);
        let texts: Vec<&str> = outcome.results.iter().map(|r| r.output_text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_parallel_respects_concurrency_and_keeps_failures() {
        let invoker = Arc::new(
            MockProviderInvoker::new(ProviderKind::OpenAi)
                .with_outcomes("m1", vec![MockOutcome::success("ok", 10)])
                .with_outcomes("m2", vec![MockOutcome::error("HTTP 429: slow down")])
                .with_outcomes("m3", vec![MockOutcome::success("ok", 10)])
                .with_outcomes("m4", vec![MockOutcome::success("ok", 10)])
                .with_delay(Duration::from_millis(10)),
        );
        let models: Vec<ModelConfig> = ["m1", "m2", "m3", "m4"]
            .iter()
            .map(|m| model(ProviderKind::OpenAi, m, m))
            .collect();

        let outcome = dispatcher(vec![invoker.clone()])
            .dispatch(
                &PromptRequest::new("Hi"),
                &models,
                &RoutingPolicy::parallel().with_concurrency(2),
                &HashMap::new(),
            )
            .await
            .unwrap();

        assert_eq!(invoker.calls().len(), 4);
        assert!(invoker.max_in_flight() <= 2);
        assert_eq!(outcome.results.len(), 4);
        assert!(!outcome.results[1].success);
        assert_eq!(outcome.aggregated_tokens, 30);
    }

    #[tokio::test]
    async fn test_disabled_models_are_skipped() {
        let invoker = Arc::new(
            MockProviderInvoker::new(ProviderKind::OpenAi)
                .with_outcomes("on", vec![MockOutcome::success("on", 1)]),
        );
        let models = vec![
            model(ProviderKind::OpenAi, "off", "off").with_disabled(true),
            model(ProviderKind::OpenAi, "on", "on"),
        ];

        let outcome = dispatcher(vec![invoker.clone()])
            .dispatch(&PromptRequest::new("Hi"), &models, &RoutingPolicy::fallback(), &HashMap::new())
            .await
            .unwrap();
        assert_eq!(invoker.calls(), vec!["on".to_string()]);
        assert_eq!(outcome.results.len(), 1);

        let all_disabled = vec![model(ProviderKind::OpenAi, "off", "off").with_disabled(true)];
        let err = dispatcher(vec![invoker])
            .dispatch(&PromptRequest::new("Hi"), &all_disabled, &RoutingPolicy::parallel(), &HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Configuration { .. }));
    }

    #[test]
    fn test_order_models_keeps_unlisted_order() {
        let a = model(ProviderKind::OpenAi, "a", "a");
        let b = model(ProviderKind::OpenAi, "b", "b");
        let c = model(ProviderKind::OpenAi, "c", "c");
        let d = ModelConfig::new(ProviderKind::Google, "gemini-1.5-flash");

        let ordered = order_models(
            vec![&a, &b, &c, &d],
            &["google:gemini-1.5-flash".to_string(), "c".to_string(), "missing".to_string()],
        );
        let ids: Vec<String> = ordered.iter().map(|m| m.display_id()).collect();
        assert_eq!(ids, vec!["google:gemini-1.5-flash", "c", "a", "b"]);
    }
}
