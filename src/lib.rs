//! Promptflow Engine
//!
//! Runs user-defined prompt workflows against multiple LLM providers:
//! - Template resolution with declared variables and step mappings
//! - Parallel and fallback routing across models, with retries
//! - Per-run credential caching with process-level defaults
//! - Step chaining, output aliases, preview runs and cancellation

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;

use std::sync::Arc;

use domain::{CredentialResolver, DomainError, ExecutionRepository};
use infrastructure::{
    credentials::ProcessDefaults,
    llm::ProviderRegistry,
    routing::ModelDispatcher,
    workflow::{
        InMemoryExecutionRepository, InMemoryOutputOffloader, PromptStepRunner, StepExecutor,
        WorkflowOrchestrator,
    },
};
use tracing::info;

/// Create an orchestrator with the standard provider adapters, process
/// defaults read from the environment and an in-memory execution store
pub fn create_orchestrator(
    config: &AppConfig,
    credentials: Arc<dyn CredentialResolver>,
) -> Result<WorkflowOrchestrator, DomainError> {
    let defaults = ProcessDefaults::from_env();
    let registry = ProviderRegistry::from_config(
        &config.providers,
        config.engine.max_continuation_segments,
        defaults,
    )?;

    Ok(create_orchestrator_with(
        config,
        registry,
        credentials,
        Arc::new(InMemoryExecutionRepository::new()),
    ))
}

/// Create an orchestrator over explicit collaborators
pub fn create_orchestrator_with(
    config: &AppConfig,
    registry: ProviderRegistry,
    credentials: Arc<dyn CredentialResolver>,
    repository: Arc<dyn ExecutionRepository>,
) -> WorkflowOrchestrator {
    info!(
        providers = ?registry.providers(),
        allowed = ?config.engine.allowed_providers,
        "Creating workflow orchestrator"
    );

    let dispatcher = ModelDispatcher::new(registry);
    let runner = PromptStepRunner::new(dispatcher, config.engine.clone());
    let mut executor = StepExecutor::new(runner);

    if let Some(threshold) = config.engine.offload_threshold_bytes {
        info!(threshold_bytes = threshold, "Output offloading enabled");
        executor = executor.with_offloader(Arc::new(InMemoryOutputOffloader::new(threshold)));
    }

    WorkflowOrchestrator::new(executor, repository, credentials)
}
