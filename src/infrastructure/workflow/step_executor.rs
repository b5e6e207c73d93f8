//! Per-step execution: dispatch on the step type, exports, traces

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Map, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use super::prompt_step::PromptStepRunner;
use crate::domain::workflow::{
    resolve_exports, ExecutionState, Step, StepKind, StepResult, StepTrace, WorkflowError,
    MAX_DELAY_MS,
};
use crate::domain::{DomainError, OffloadedOutput, OutputOffloader};
use crate::infrastructure::credentials::CredentialCache;
use crate::infrastructure::observability::record_step;

/// Whether a run has real side effects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Live,
    Preview,
}

impl RunMode {
    pub fn is_preview(self) -> bool {
        self == Self::Preview
    }
}

/// Per-run collaborators handed to every step
#[derive(Debug, Clone, Copy)]
pub struct RunContext<'a> {
    pub credentials: &'a CredentialCache,
    pub mode: RunMode,

    /// Set for persisted runs only; enables output offloading
    pub execution_id: Option<Uuid>,
}

impl<'a> RunContext<'a> {
    pub fn live(credentials: &'a CredentialCache, execution_id: Uuid) -> Self {
        Self {
            credentials,
            mode: RunMode::Live,
            execution_id: Some(execution_id),
        }
    }

    pub fn preview(credentials: &'a CredentialCache) -> Self {
        Self {
            credentials,
            mode: RunMode::Preview,
            execution_id: None,
        }
    }
}

/// A failed step with the trace recorded for it
#[derive(Debug, Clone)]
pub struct StepFailure {
    pub error: WorkflowError,
    pub trace: StepTrace,
}

/// Executes single steps against an execution state
#[derive(Debug, Clone)]
pub struct StepExecutor {
    prompt: PromptStepRunner,
    offloader: Option<Arc<dyn OutputOffloader>>,
}

impl StepExecutor {
    pub fn new(prompt: PromptStepRunner) -> Self {
        Self {
            prompt,
            offloader: None,
        }
    }

    pub fn with_offloader(mut self, offloader: Arc<dyn OutputOffloader>) -> Self {
        self.offloader = Some(offloader);
        self
    }

    pub fn prompt_runner(&self) -> &PromptStepRunner {
        &self.prompt
    }

    /// Produce the raw result of one step
    pub async fn execute(
        &self,
        step: &Step,
        input: &Map<String, Value>,
        ctx: RunContext<'_>,
    ) -> Result<StepResult, DomainError> {
        match &step.kind {
            StepKind::Prompt(config) => self
                .prompt
                .run(&step.name, config, input, ctx.credentials, ctx.mode)
                .await
                .map(StepResult::prompt),

            StepKind::Transform(config) => {
                let (output, warnings) = config.apply(input);
                Ok(StepResult::value(output).with_warnings(warnings))
            }

            StepKind::Condition(config) => Ok(StepResult::value(config.evaluate(input))),

            StepKind::Delay(config) => {
                let delay_ms = config.effective_delay_ms();
                let mut warnings = Vec::new();
                if config.delay_ms > MAX_DELAY_MS {
                    warnings.push(format!("Delay capped at {}ms", MAX_DELAY_MS));
                }

                let output = if ctx.mode.is_preview() {
                    json!({"delayed": false, "delayMs": delay_ms, "simulated": true})
                } else {
                    if delay_ms > 0 {
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    }
                    json!({"delayed": true, "delayMs": delay_ms})
                };

                Ok(StepResult::value(output).with_warnings(warnings))
            }

            StepKind::Webhook(config) => Ok(StepResult::value(config.simulate(input))
                .with_warnings(vec![
                    "Webhook steps are simulated; no request was sent".to_string()
                ])),

            StepKind::Decision(config) => Ok(StepResult::value(config.simulate())),
        }
    }

    /// Run one step and fold its result into the next state
    pub async fn run_step(
        &self,
        step: &Step,
        state: &ExecutionState,
        ctx: RunContext<'_>,
    ) -> Result<ExecutionState, StepFailure> {
        let step_type = step.kind.type_name();
        let input = state.step_input();
        let trace = StepTrace::new(step.display_id(), &step.name, step_type, step.order, input.clone());

        debug!(
            step_id = %step.display_id(),
            step = %step.name,
            step_type = step_type,
            order = step.order,
            "Executing step"
        );

        let started = Instant::now();
        let result = self.execute(step, &input, ctx).await;
        let elapsed = started.elapsed();
        record_step(step_type, result.is_ok(), elapsed);

        let result = match result {
            Ok(result) => result,
            Err(e) => {
                warn!(
                    step_id = %step.display_id(),
                    step = %step.name,
                    error = %e,
                    "Step failed"
                );
                return Err(StepFailure {
                    trace: trace
                        .with_duration_ms(elapsed.as_millis() as u64)
                        .with_warnings(e.warnings().to_vec())
                        .with_error(e.to_string()),
                    error: WorkflowError::step_execution(step.display_id(), &step.name, e),
                });
            }
        };

        let (exports, export_warnings) = resolve_exports(&step.outputs, &result.output);
        let mut warnings = result.warnings.clone();
        warnings.extend(export_warnings);

        let offloaded = self.offload(&result, ctx, &mut warnings).await;
        let mut trace_output = result.output.clone();
        if let (Some(offloaded), Value::Object(fields)) = (&offloaded, &mut trace_output) {
            fields.insert(
                "generatedText".to_string(),
                Value::String(offloaded.preview.clone()),
            );
        }

        let trace = trace
            .with_output(trace_output)
            .with_offloaded(offloaded)
            .with_exports(exports.clone())
            .with_duration_ms(elapsed.as_millis() as u64)
            .with_warnings(warnings)
            .with_tokens_used(result.tokens_used);

        Ok(state.apply_step(&result, &exports, trace))
    }

    /// Offload large generated text; the inline copy stays in the state
    async fn offload(
        &self,
        result: &StepResult,
        ctx: RunContext<'_>,
        warnings: &mut Vec<String>,
    ) -> Option<OffloadedOutput> {
        let offloader = self.offloader.as_ref()?;
        let execution_id = ctx.execution_id?;
        let text = result.generated_text().filter(|t| !t.is_empty())?;

        match offloader
            .offload(text, ctx.credentials.owner_id(), &execution_id)
            .await
        {
            Ok(offloaded) => offloaded,
            Err(e) => {
                warn!(execution_id = %execution_id, error = %e, "Output offload failed");
                warnings.push(format!("Output offload failed, keeping text inline: {}", e));
                None
            }
        }
    }
}
