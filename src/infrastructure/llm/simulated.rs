//! Results produced without calling a provider

use crate::domain::llm::{
    FinishReason, ModelConfig, PromptRequest, ProviderInvocationResult, SIMULATED_OUTPUT_MARKER,
};

const PROMPT_PREVIEW_CHARS: usize = 120;

/// Clearly labelled placeholder text for `request`
pub fn simulated_text(provider: &str, model: &str, request: &PromptRequest) -> String {
    let preview: String = request.prompt.chars().take(PROMPT_PREVIEW_CHARS).collect();
    let ellipsis = if request.prompt.chars().count() > PROMPT_PREVIEW_CHARS {
        "..."
    } else {
        ""
    };

    format!(
        "{} {}/{} would respond to: {}{}",
        SIMULATED_OUTPUT_MARKER, provider, model, preview, ellipsis
    )
}

/// Successful result returned when no secret is available for a provider
pub fn simulated_result(
    request: &PromptRequest,
    model: &ModelConfig,
    reason: impl Into<String>,
) -> ProviderInvocationResult {
    let provider = model.provider;

    tracing::debug!(
        provider = %provider,
        model = %model.model,
        "Returning simulated output"
    );

    ProviderInvocationResult::success(
        provider,
        &model.model,
        simulated_text(provider.as_str(), &model.model, request),
    )
    .with_finish_reason(Some(FinishReason::Stop))
    .with_warning(reason)
    .with_metadata("simulated", true)
}

/// Warning attached when no key is configured for a provider
pub fn missing_key_warning(provider: &str) -> String {
    format!(
        "No API key configured for {}; returned a simulated response without calling the provider",
        provider
    )
}
