//! Metrics for provider calls, steps and runs

mod metrics;

pub use metrics::{
    record_execution, record_llm_request, record_llm_retry, record_step, LlmRequestMetricParams,
};
