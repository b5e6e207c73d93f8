//! Workflow domain module
//!
//! A workflow is a flat, user-ordered list of steps. Each step receives the
//! accumulated variable bag (workflow input merged with every earlier step's
//! output and export aliases) plus chaining variables derived from the most
//! recent prompt step:
//! - `previous` / `previousGeneratedText` - generated text
//! - `previousModel` - model that produced it
//! - `previousProvider` - provider that produced it

mod context;
mod entity;
mod error;
mod execution;
mod output;
pub mod repository;
mod step_types;

pub use context::{
    extract_path, resolve_exports, ExecutionState, PREVIOUS, PREVIOUS_GENERATED_TEXT,
    PREVIOUS_MODEL, PREVIOUS_PROVIDER,
};
pub use entity::{
    DataType, Step, ValidationRules, VariableRole, WorkflowDefinition, WorkflowVariable,
};
pub use error::WorkflowError;
pub use execution::{ExecutionErrorPayload, ExecutionStatus, StepTrace, WorkflowExecution};
pub use output::{PromptStepOutput, StepResult};
pub use repository::{ExecutionPage, ExecutionRepository};
pub use step_types::{
    ConditionOperator, ConditionStepConfig, DecisionStepConfig, DelayStepConfig,
    LegacyModelSettings, PromptStepConfig, StepKind, TransformOp, TransformOperation,
    TransformStepConfig, WebhookStepConfig, MAX_DELAY_MS,
};
