//! Metric recording helpers.
//!
//! Values go to whatever `metrics` recorder the embedding process installs;
//! without one they are dropped.

use std::time::Duration;

use metrics::{counter, histogram};

/// Record the final outcome of one model invocation (after retries)
pub fn record_llm_request(params: LlmRequestMetricParams) {
    let labels = [
        ("provider", params.provider.to_string()),
        ("model", params.model.to_string()),
        ("status", if params.success { "success" } else { "error" }.to_string()),
    ];

    counter!("llm_requests_total", &labels).increment(1);
    histogram!("llm_request_duration_seconds", &labels).record(params.duration.as_secs_f64());

    if let Some(tokens) = params.input_tokens {
        counter!("llm_input_tokens_total", &labels).increment(tokens);
    }

    if let Some(tokens) = params.output_tokens {
        counter!("llm_output_tokens_total", &labels).increment(tokens);
    }

    if !params.success {
        counter!("llm_errors_total", &labels).increment(1);
    }
}

/// Parameters for LLM request metrics
pub struct LlmRequestMetricParams<'a> {
    pub provider: &'a str,
    pub model: &'a str,
    pub duration: Duration,
    pub success: bool,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
}

/// Record one failed attempt that is about to be retried
pub fn record_llm_retry(provider: &str, model: &str) {
    let labels = [("provider", provider.to_string()), ("model", model.to_string())];
    counter!("llm_retries_total", &labels).increment(1);
}

/// Record one executed workflow step
pub fn record_step(step_type: &str, success: bool, duration: Duration) {
    let labels = [
        ("type", step_type.to_string()),
        ("status", if success { "success" } else { "error" }.to_string()),
    ];

    counter!("workflow_steps_total", &labels).increment(1);
    histogram!("workflow_step_duration_seconds", &labels).record(duration.as_secs_f64());
}

/// Record a finished run by terminal status
pub fn record_execution(status: &str, preview: bool) {
    let labels = [
        ("status", status.to_string()),
        ("mode", if preview { "preview" } else { "live" }.to_string()),
    ];

    counter!("workflow_executions_total", &labels).increment(1);
}
