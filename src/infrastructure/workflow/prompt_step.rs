//! Prompt step pipeline: template, models, credentials, dispatch, primary result

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::RunMode;
use crate::config::EngineSettings;
use crate::domain::credentials::CredentialProviderKey;
use crate::domain::llm::{is_authentication_error, ModelConfig, PromptRequest};
use crate::domain::prompt::resolve_template;
use crate::domain::workflow::{PromptStepConfig, PromptStepOutput};
use crate::domain::DomainError;
use crate::infrastructure::credentials::CredentialCache;
use crate::infrastructure::llm::simulated_text;
use crate::infrastructure::routing::{DispatchOutcome, ModelDispatcher};

/// Runs PROMPT steps
#[derive(Debug, Clone)]
pub struct PromptStepRunner {
    dispatcher: ModelDispatcher,
    settings: EngineSettings,
}

impl PromptStepRunner {
    pub fn new(dispatcher: ModelDispatcher, settings: EngineSettings) -> Self {
        let dispatcher = dispatcher.with_default_retry(settings.default_retry.clone());
        Self {
            dispatcher,
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub async fn run(
        &self,
        step_name: &str,
        config: &PromptStepConfig,
        input: &Map<String, Value>,
        credentials: &CredentialCache,
        mode: RunMode,
    ) -> Result<PromptStepOutput, DomainError> {
        let (template, declared) = config
            .template()
            .ok_or_else(|| DomainError::configuration("Step has no prompt content"))?;

        let resolution = resolve_template(template, declared, input, &config.variables);
        let mut warnings = resolution.warnings.clone();

        let mut request = PromptRequest::new(resolution.text.clone());
        if let Some(ref instructions) = config.instructions {
            let resolved = resolve_template(instructions, declared, input, &config.variables);
            push_unique(&mut warnings, resolved.warnings);
            request = request.with_instructions(resolved.text);
        }

        let models = self.build_models(config)?;

        let keys: BTreeSet<CredentialProviderKey> = models
            .iter()
            .filter_map(|m| m.provider.credential_key())
            .collect();
        let keys: Vec<CredentialProviderKey> = keys.into_iter().collect();
        let resolved = credentials.resolve(&keys).await;

        for key in keys.iter().filter(|k| !resolved.contains_key(k)) {
            warnings.push(format!(
                "No active credential for {}, falling back to default configuration",
                key
            ));
        }

        debug!(
            step = %step_name,
            models = models.len(),
            credentials = resolved.len(),
            "Running prompt step"
        );

        let outcome = self
            .dispatcher
            .dispatch(&request, &models, &config.routing, &resolved)
            .await?;

        warnings.extend(result_warnings(&outcome));

        let (generated_text, model, provider, simulated) = match outcome.primary() {
            Some(primary) => (
                primary.output_text.clone(),
                primary.model.clone(),
                primary.provider.to_string(),
                primary.is_simulated(),
            ),
            None => {
                let first = outcome.failures().next();

                let auth_only = outcome.failures().count() > 0
                    && outcome
                        .failures()
                        .all(|r| r.error.as_deref().is_some_and(is_authentication_error));

                match first {
                    Some(first)
                        if auth_only
                            && mode == RunMode::Preview
                            && self.settings.simulated_fallback =>
                    {
                        warn!(
                            step = %step_name,
                            "All models failed authentication, substituting simulated preview output"
                        );
                        warnings.push(
                            "All configured models failed authentication; showing simulated output for preview"
                                .to_string(),
                        );
                        (
                            simulated_text(first.provider.as_str(), &first.model, &request),
                            first.model.clone(),
                            first.provider.to_string(),
                            true,
                        )
                    }
                    _ => {
                        let message = first
                            .and_then(|r| r.error.clone())
                            .unwrap_or_else(|| "No model returned any output".to_string());
                        let failures = outcome
                            .results
                            .iter()
                            .map(|r| {
                                format!(
                                    "{}/{}: {}",
                                    r.provider,
                                    r.model,
                                    r.error.as_deref().unwrap_or("empty output")
                                )
                            })
                            .collect();

                        return Err(DomainError::aggregate_failure(step_name, message, failures)
                            .with_warnings(warnings));
                    }
                }
            }
        };

        Ok(build_output(
            resolution.text,
            generated_text,
            model,
            provider,
            simulated,
            resolution.values,
            outcome,
            warnings,
        ))
    }

    /// Model list of a step: allow-listed, normalized and clamped.
    ///
    /// Falls back to the legacy single-model settings when no list is configured.
    pub fn build_models(&self, config: &PromptStepConfig) -> Result<Vec<ModelConfig>, DomainError> {
        let mut models = if config.models.is_empty() {
            match config.model_settings {
                Some(ref legacy) => vec![legacy.to_model_config()?],
                None => {
                    return Err(DomainError::configuration(
                        "Prompt step has no models configured",
                    ))
                }
            }
        } else {
            config.models.clone()
        };

        for model in models.iter_mut() {
            if !self.settings.is_provider_allowed(model.provider) {
                return Err(DomainError::configuration(format!(
                    "Provider '{}' is not allowed",
                    model.provider
                )));
            }

            *model = model.clone().normalized();
            model.parameters.clamp_max_tokens(
                self.settings.min_completion_tokens,
                self.settings.max_completion_tokens,
            );
        }

        Ok(models)
    }
}

fn push_unique(warnings: &mut Vec<String>, extra: Vec<String>) {
    for warning in extra {
        if !warnings.contains(&warning) {
            warnings.push(warning);
        }
    }
}

/// Warnings of successful results and one summary per failed model
fn result_warnings(outcome: &DispatchOutcome) -> Vec<String> {
    let mut warnings = Vec::new();

    for result in &outcome.results {
        if result.success {
            warnings.extend(
                result
                    .warnings
                    .iter()
                    .map(|w| format!("{}/{}: {}", result.provider, result.model, w)),
            );
        } else {
            warnings.push(format!(
                "{}/{} failed after {} attempt(s): {}",
                result.provider,
                result.model,
                result.retries + 1,
                result.error.as_deref().unwrap_or("unknown error")
            ));
        }
    }

    warnings
}

#[allow(clippy::too_many_arguments)]
fn build_output(
    resolved_prompt: String,
    generated_text: String,
    model: String,
    provider: String,
    simulated: bool,
    variables: BTreeMap<String, Value>,
    outcome: DispatchOutcome,
    warnings: Vec<String>,
) -> PromptStepOutput {
    let mut outputs: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
    let mut prompt_tokens = 0;
    let mut completion_tokens = 0;

    for result in &outcome.results {
        if let Some(usage) = result.usage {
            prompt_tokens += usage.prompt_tokens;
            completion_tokens += usage.completion_tokens;
        }

        if result.success {
            outputs
                .entry(result.provider.to_string())
                .or_default()
                .insert(result.model.clone(), result.output_text.clone());
        }
    }

    PromptStepOutput {
        resolved_prompt,
        generated_text,
        model,
        provider,
        tokens_used: outcome.aggregated_tokens,
        prompt_tokens,
        completion_tokens,
        outputs,
        results: outcome.results,
        variables,
        warnings,
        simulated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::credentials::mock::MockCredentialResolver;
    use crate::domain::credentials::ResolvedCredential;
    use crate::domain::llm::mock::{MockOutcome, MockProviderInvoker};
    use crate::domain::llm::{ProviderKind, RetryPolicy, RoutingPolicy, SIMULATED_OUTPUT_MARKER};
    use crate::domain::prompt::{Prompt, PromptVariable};
    use crate::domain::workflow::LegacyModelSettings;
    use crate::infrastructure::llm::ProviderRegistry;
    use crate::infrastructure::routing::RetryExecutor;
    use serde_json::json;
    use std::sync::Arc;

    fn runner(invokers: Vec<Arc<MockProviderInvoker>>, settings: EngineSettings) -> PromptStepRunner {
        let registry = invokers
            .into_iter()
            .fold(ProviderRegistry::new(), |r, i| r.with_invoker(i));
        let dispatcher =
            ModelDispatcher::new(registry).with_retry_executor(RetryExecutor::new().with_jitter_ms(0));
        PromptStepRunner::new(
            dispatcher,
            settings.with_default_retry(RetryPolicy::new(1).with_base_delay(1).with_max_delay(2)),
        )
    }

    fn cache() -> CredentialCache {
        CredentialCache::new(Arc::new(MockCredentialResolver::new()), "owner-1")
    }

    fn input(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_prompt_step_resolves_and_dispatches() {
        let invoker = Arc::new(
            MockProviderInvoker::new(ProviderKind::OpenAi)
                .with_outcomes("gpt-4o", vec![MockOutcome::success("Hi Ada", 20)]),
        );
        let config = PromptStepConfig::with_content("Greet {{name}} on {{day}}")
            .with_variable("day", "Friday")
            .with_model(ModelConfig::new(ProviderKind::OpenAi, "gpt-4o"));

        let output = runner(vec![invoker.clone()], EngineSettings::default())
            .run("Greet", &config, &input(json!({"name": "Ada"})), &cache(), RunMode::Live)
            .await
            .unwrap();

        assert_eq!(output.resolved_prompt, "Greet Ada on Friday");
        assert_eq!(invoker.prompts(), vec!["Greet Ada on Friday".to_string()]);
        assert_eq!(output.generated_text, "Hi Ada");
        assert_eq!(output.model, "gpt-4o");
        assert_eq!(output.provider, "openai");
        assert_eq!(output.tokens_used, 20);
        assert_eq!(output.prompt_tokens + output.completion_tokens, 20);
        assert_eq!(output.outputs["openai"]["gpt-4o"], "Hi Ada");
        assert!(!output.simulated);
        assert!(output
            .warnings
            .contains(&"No active credential for openai, falling back to default configuration".to_string()));
    }

    #[tokio::test]
    async fn test_missing_content_is_configuration_error() {
        let config = PromptStepConfig::default()
            .with_model(ModelConfig::new(ProviderKind::OpenAi, "gpt-4o"));

        let err = runner(vec![], EngineSettings::default())
            .run("Empty", &config, &Map::new(), &cache(), RunMode::Live)
            .await
            .unwrap_err();

        assert_eq!(err, DomainError::configuration("Step has no prompt content"));
    }

    #[tokio::test]
    async fn test_attached_prompt_wins_over_inline_content() {
        let invoker = Arc::new(
            MockProviderInvoker::new(ProviderKind::OpenAi)
                .with_outcomes("gpt-4o-mini", vec![MockOutcome::success("ok", 2)]),
        );
        let prompt = Prompt::new("p1", "Attached {{topic}}")
            .with_variable(PromptVariable::with_default("topic", "rust"));
        let mut config = PromptStepConfig::with_content("Inline").with_prompt(prompt);
        config.models.push(ModelConfig::new(ProviderKind::OpenAi, ""));

        let output = runner(vec![invoker], EngineSettings::default())
            .run("Attached", &config, &Map::new(), &cache(), RunMode::Live)
            .await
            .unwrap();

        assert_eq!(output.resolved_prompt, "Attached rust");
        assert_eq!(output.variables["topic"], json!("rust"));
        assert_eq!(output.model, "gpt-4o-mini");
    }

    #[tokio::test]
    async fn test_all_models_fail_in_live_mode() {
        let invoker = Arc::new(
            MockProviderInvoker::new(ProviderKind::Anthropic)
                .with_outcomes("claude", vec![MockOutcome::error("HTTP 529: Overloaded")]),
        );
        let config = PromptStepConfig::with_content("Summarize")
            .with_model(ModelConfig::new(ProviderKind::Anthropic, "claude"));

        let err = runner(vec![invoker], EngineSettings::default())
            .run("Summarize notes", &config, &Map::new(), &cache(), RunMode::Live)
            .await
            .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("Summarize notes"));
        assert!(message.contains("HTTP 529: Overloaded"));
        assert!(!message.contains(SIMULATED_OUTPUT_MARKER));
    }

    #[tokio::test]
    async fn test_auth_failures_substitute_only_in_preview() {
        let make = || {
            Arc::new(
                MockProviderInvoker::new(ProviderKind::OpenAi)
                    .with_outcomes("gpt-4o", vec![MockOutcome::error("HTTP 401: Incorrect API key provided")]),
            )
        };
        let config = PromptStepConfig::with_content("Hello")
            .with_model(ModelConfig::new(ProviderKind::OpenAi, "gpt-4o"));

        let output = runner(vec![make()], EngineSettings::default())
            .run("Hello", &config, &Map::new(), &cache(), RunMode::Preview)
            .await
            .unwrap();

        assert!(!output.generated_text.is_empty());
        assert!(output.generated_text.contains(SIMULATED_OUTPUT_MARKER));
        assert!(output.simulated);
        assert!(output.warnings.iter().any(|w| w.contains("authentication")));

        let err = runner(vec![make()], EngineSettings::default())
            .run("Hello", &config, &Map::new(), &cache(), RunMode::Live)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::AggregateFailure { .. }));

        let disabled = EngineSettings::default().with_simulated_fallback(false);
        assert!(runner(vec![make()], disabled)
            .run("Hello", &config, &Map::new(), &cache(), RunMode::Preview)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_mixed_failures_do_not_substitute_in_preview() {
        let invoker = Arc::new(
            MockProviderInvoker::new(ProviderKind::OpenAi)
                .with_outcomes("a", vec![MockOutcome::error("HTTP 401: Unauthorized")])
                .with_outcomes("b", vec![MockOutcome::error("HTTP 500: Internal error")]),
        );
        let config = PromptStepConfig::with_content("Hello {{audience}}")
            .with_model(ModelConfig::new(ProviderKind::OpenAi, "a"))
            .with_model(ModelConfig::new(ProviderKind::OpenAi, "b"));

        let err = runner(vec![invoker], EngineSettings::default())
            .run("Hello", &config, &Map::new(), &cache(), RunMode::Preview)
            .await
            .unwrap_err();

        match err {
            DomainError::AggregateFailure { message, failures, warnings, .. } => {
                assert_eq!(message, "HTTP 401: Unauthorized");
                assert_eq!(failures.len(), 2);
                assert!(warnings.contains(&"Unresolved template variable: audience".to_string()));
                assert!(warnings
                    .iter()
                    .any(|w| w.starts_with("openai/b failed after 1 attempt(s): HTTP 500")));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_credentials_resolved_once_per_provider() {
        let resolver = Arc::new(MockCredentialResolver::new().with_credential(
            ResolvedCredential::new(CredentialProviderKey::OpenAi, "sk-stored"),
        ));
        let credentials = CredentialCache::new(resolver.clone(), "owner-1");
        let invoker = Arc::new(
            MockProviderInvoker::new(ProviderKind::OpenAi)
                .with_outcomes("a", vec![MockOutcome::success("a", 1)])
                .with_outcomes("b", vec![MockOutcome::success("b", 1)]),
        );
        let config = PromptStepConfig::with_content("Hi")
            .with_model(ModelConfig::new(ProviderKind::OpenAi, "a"))
            .with_model(ModelConfig::new(ProviderKind::OpenAi, "b"))
            .with_routing(RoutingPolicy::parallel());
        let runner = runner(vec![invoker], EngineSettings::default());

        let first = runner
            .run("One", &config, &Map::new(), &credentials, RunMode::Live)
            .await
            .unwrap();
        runner
            .run("Two", &config, &Map::new(), &credentials, RunMode::Live)
            .await
            .unwrap();

        assert_eq!(resolver.call_count(), 1);
        assert_eq!(resolver.requested(), vec![CredentialProviderKey::OpenAi]);
        assert!(first.warnings.iter().all(|w| !w.contains("No active credential")));
        assert_eq!(first.results.len(), 2);
    }

    #[test]
    fn test_build_models_legacy_allow_list_and_clamp() {
        let mut legacy = PromptStepConfig::with_content("Hi");
        legacy.model_settings = Some(LegacyModelSettings {
            provider: "anthropic".to_string(),
            model: None,
            temperature: Some(0.3),
            max_tokens: Some(100_000),
            top_p: None,
        });

        let settings = EngineSettings::default().with_completion_window(Some(64), Some(2048));
        let models = runner(vec![], settings).build_models(&legacy).unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].provider, ProviderKind::Anthropic);
        assert_eq!(models[0].model, "claude-3-5-sonnet-latest");
        assert_eq!(models[0].parameters.max_tokens, Some(2048));

        let restricted = EngineSettings::default().with_allowed_providers(vec![ProviderKind::OpenAi]);
        let err = runner(vec![], restricted).build_models(&legacy).unwrap_err();
        assert!(err.to_string().contains("not allowed"));

        let err = runner(vec![], EngineSettings::default())
            .build_models(&PromptStepConfig::with_content("Hi"))
            .unwrap_err();
        assert!(matches!(err, DomainError::Configuration { .. }));
    }
}
