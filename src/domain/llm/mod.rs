//! LLM domain - provider identities, model/routing configuration and canonical results

mod message;
mod model_config;
mod provider;
mod request;
mod result;

pub use message::{Message, MessageRole};
pub use model_config::{
    GenerationParameters, ModelConfig, OnErrorBehavior, ResponseFormat, RetryPolicy, RoutingMode,
    RoutingPolicy,
};
pub use provider::{ProviderInvoker, ProviderKind};
pub use request::PromptRequest;
pub use result::{
    is_authentication_error, FinishReason, ProviderInvocationResult, TokenUsage,
    SIMULATED_OUTPUT_MARKER,
};

#[cfg(test)]
pub use provider::mock;
