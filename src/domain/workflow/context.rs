//! Execution state threaded from step to step
//!
//! The state is an immutable value: applying a step's result produces a new
//! state for the next step.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::execution::StepTrace;
use super::output::{PromptStepOutput, StepResult};

pub const PREVIOUS: &str = "previous";
pub const PREVIOUS_GENERATED_TEXT: &str = "previousGeneratedText";
pub const PREVIOUS_MODEL: &str = "previousModel";
pub const PREVIOUS_PROVIDER: &str = "previousProvider";

/// Transient per-run state
#[derive(Debug, Clone, Default)]
pub struct ExecutionState {
    /// Input merged with every step's raw output and exports
    variables: Map<String, Value>,

    /// Output of the most recent prompt step, used for chaining
    last_prompt: Option<PromptStepOutput>,

    traces: Vec<StepTrace>,

    total_tokens: u64,
}

impl ExecutionState {
    pub fn new(input: Map<String, Value>) -> Self {
        Self {
            variables: input,
            ..Default::default()
        }
    }

    pub fn variables(&self) -> &Map<String, Value> {
        &self.variables
    }

    pub fn last_prompt(&self) -> Option<&PromptStepOutput> {
        self.last_prompt.as_ref()
    }

    pub fn traces(&self) -> &[StepTrace] {
        &self.traces
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_tokens
    }

    /// Variables derived from the previous prompt step
    pub fn chaining_variables(&self) -> Map<String, Value> {
        let mut vars = Map::new();

        if let Some(ref prompt) = self.last_prompt {
            let text = Value::String(prompt.generated_text.clone());
            vars.insert(PREVIOUS.to_string(), text.clone());
            vars.insert(PREVIOUS_GENERATED_TEXT.to_string(), text);
            vars.insert(PREVIOUS_MODEL.to_string(), Value::String(prompt.model.clone()));
            vars.insert(
                PREVIOUS_PROVIDER.to_string(),
                Value::String(prompt.provider.clone()),
            );
        }

        vars
    }

    /// Input for the next step: the accumulated bag with chaining variables on top
    pub fn step_input(&self) -> Map<String, Value> {
        let mut input = self.variables.clone();
        input.extend(self.chaining_variables());
        input
    }

    /// Produce the state that follows a completed step
    pub fn apply_step(&self, result: &StepResult, exports: &Map<String, Value>, trace: StepTrace) -> Self {
        let mut variables = self.variables.clone();

        match &result.output {
            Value::Object(fields) => {
                variables.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            Value::Null => {}
            other => {
                variables.insert("output".to_string(), other.clone());
            }
        }
        variables.extend(exports.iter().map(|(k, v)| (k.clone(), v.clone())));

        let last_prompt = match result.prompt {
            Some(ref prompt) => Some(prompt.clone()),
            None => self.last_prompt.clone(),
        };

        let mut traces = self.traces.clone();
        traces.push(trace);

        Self {
            variables,
            last_prompt,
            traces,
            total_tokens: self.total_tokens + result.tokens_used,
        }
    }
}

/// Get a nested field from a JSON value using dot notation
pub fn extract_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let path = path.trim();
    if path.is_empty() {
        return Some(value);
    }

    let mut current = value;

    for part in path.split('.') {
        match current {
            Value::Object(obj) => {
                current = obj.get(part)?;
            }
            Value::Array(arr) => {
                let index: usize = part.parse().ok()?;
                current = arr.get(index)?;
            }
            _ => return None,
        }
    }

    Some(current)
}

/// Resolve a step's `outputs` alias map against its raw output
pub fn resolve_exports(
    outputs: &BTreeMap<String, String>,
    raw: &Value,
) -> (Map<String, Value>, Vec<String>) {
    let mut exports = Map::new();
    let mut warnings = Vec::new();

    for (alias, path) in outputs {
        match extract_path(raw, path) {
            Some(value) => {
                exports.insert(alias.clone(), value.clone());
            }
            None => {
                warnings.push(format!(
                    "Output alias '{}' could not be resolved from path '{}'",
                    alias, path
                ));
            }
        }
    }

    (exports, warnings)
}
