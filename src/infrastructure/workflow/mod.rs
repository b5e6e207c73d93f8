//! Workflow infrastructure implementations

mod in_memory_repository;
mod offload;
mod orchestrator;
mod preview;
mod prompt_step;
mod step_executor;

pub use in_memory_repository::InMemoryExecutionRepository;
pub use offload::{InMemoryOutputOffloader, StoredOutput};
pub use orchestrator::WorkflowOrchestrator;
pub use preview::PreviewResult;
pub use prompt_step::PromptStepRunner;
pub use step_executor::{RunContext, RunMode, StepExecutor, StepFailure};
