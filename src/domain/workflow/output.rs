//! Step outputs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::llm::ProviderInvocationResult;

/// Composite output of a prompt step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptStepOutput {
    pub resolved_prompt: String,
    pub generated_text: String,
    pub model: String,
    pub provider: String,

    /// Sum of every model's total tokens
    pub tokens_used: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,

    /// Generated text keyed by provider, then model
    pub outputs: BTreeMap<String, BTreeMap<String, String>>,

    pub results: Vec<ProviderInvocationResult>,

    /// Resolved value of each declared template variable
    pub variables: BTreeMap<String, Value>,

    pub warnings: Vec<String>,

    /// Set when `generated_text` was not produced by a provider
    #[serde(default)]
    pub simulated: bool,
}

impl PromptStepOutput {
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// What a step hands back to the orchestrator
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    /// Raw output merged into the variable bag
    pub output: Value,

    /// Present for prompt steps only
    pub prompt: Option<PromptStepOutput>,

    pub warnings: Vec<String>,

    pub tokens_used: u64,
}

impl StepResult {
    pub fn prompt(output: PromptStepOutput) -> Self {
        Self {
            output: output.to_value(),
            warnings: output.warnings.clone(),
            tokens_used: output.tokens_used,
            prompt: Some(output),
        }
    }

    pub fn value(output: Value) -> Self {
        Self {
            output,
            prompt: None,
            warnings: Vec::new(),
            tokens_used: 0,
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings.extend(warnings);
        self
    }

    /// Generated text eligible for offloading
    pub fn generated_text(&self) -> Option<&str> {
        self.prompt.as_ref().map(|p| p.generated_text.as_str())
    }
}
