//! Domain layer - Core entities, traits and pure workflow logic

pub mod credentials;
pub mod error;
pub mod llm;
pub mod offload;
pub mod prompt;
pub mod workflow;

pub use credentials::{CredentialProviderKey, CredentialResolver, ResolvedCredential};
pub use error::DomainError;
pub use llm::{
    FinishReason, GenerationParameters, Message, MessageRole, ModelConfig, OnErrorBehavior,
    PromptRequest, ProviderInvocationResult, ProviderInvoker, ProviderKind, ResponseFormat,
    RetryPolicy, RoutingMode, RoutingPolicy, TokenUsage,
};
pub use offload::{OffloadedOutput, OutputOffloader};
pub use prompt::{resolve_template, Prompt, PromptVariable, TemplateResolution};
pub use workflow::{
    ExecutionRepository, ExecutionState, ExecutionStatus, PromptStepConfig, Step, StepKind,
    StepTrace, WorkflowDefinition, WorkflowError, WorkflowExecution,
};
