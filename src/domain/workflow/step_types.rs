//! Workflow step type definitions

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Number, Value};

use super::context::extract_path;
use crate::domain::llm::{GenerationParameters, ModelConfig, ProviderKind, RoutingPolicy};
use crate::domain::prompt::{value_to_string, Prompt, PromptVariable};
use crate::domain::DomainError;

/// Upper bound for a DELAY step
pub const MAX_DELAY_MS: u64 = 300_000;

/// Type of workflow step with its configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepKind {
    /// Templated prompt dispatched to one or more models
    Prompt(PromptStepConfig),

    /// Per-field value transformations
    Transform(TransformStepConfig),

    /// Single predicate producing a branch name
    Condition(ConditionStepConfig),

    /// Pause before the next step
    Delay(DelayStepConfig),

    /// Outbound notification (simulated)
    Webhook(WebhookStepConfig),

    /// Choice between named options (simulated)
    Decision(DecisionStepConfig),
}

impl StepKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Prompt(_) => "PROMPT",
            Self::Transform(_) => "TRANSFORM",
            Self::Condition(_) => "CONDITION",
            Self::Delay(_) => "DELAY",
            Self::Webhook(_) => "WEBHOOK",
            Self::Decision(_) => "DECISION",
        }
    }

    pub fn is_prompt(&self) -> bool {
        matches!(self, Self::Prompt(_))
    }
}

/// Single-model settings of older step configurations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LegacyModelSettings {
    pub provider: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
}

impl LegacyModelSettings {
    pub fn to_model_config(&self) -> Result<ModelConfig, DomainError> {
        let provider: ProviderKind = self.provider.parse()?;

        Ok(ModelConfig::new(provider, self.model.clone().unwrap_or_default())
            .with_id("legacy")
            .with_parameters(GenerationParameters {
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                top_p: self.top_p,
                ..Default::default()
            })
            .normalized())
    }
}

/// Prompt step configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PromptStepConfig {
    /// Attached prompt record; takes precedence over `prompt_content`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<Prompt>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_content: Option<String>,

    /// System instructions sent alongside the prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    /// Step-level variable mapping (name -> value)
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub variables: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub models: Vec<ModelConfig>,

    #[serde(default)]
    pub routing: RoutingPolicy,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_settings: Option<LegacyModelSettings>,
}

impl PromptStepConfig {
    pub fn with_content(content: impl Into<String>) -> Self {
        Self {
            prompt_content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn with_prompt(mut self, prompt: Prompt) -> Self {
        self.prompt = Some(prompt);
        self
    }

    pub fn with_model(mut self, model: ModelConfig) -> Self {
        self.models.push(model);
        self
    }

    pub fn with_routing(mut self, routing: RoutingPolicy) -> Self {
        self.routing = routing;
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// Template text and declared variables, if any content is configured
    pub fn template(&self) -> Option<(&str, &[PromptVariable])> {
        if let Some(ref prompt) = self.prompt {
            if prompt.has_content() {
                return Some((prompt.content.as_str(), prompt.variables.as_slice()));
            }
        }

        self.prompt_content
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .map(|c| (c, &[][..]))
    }
}

/// Transform operation kind
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransformOp {
    Uppercase,
    Lowercase,
    Number,
    Concat,
}

/// One field transformation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransformOperation {
    /// Target field written in the output
    pub field: String,

    pub op: TransformOp,

    /// Path read from the input; defaults to `field`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Concat parts: input paths, or literals when the path is absent
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub separator: Option<String>,
}

impl TransformOperation {
    pub fn new(field: impl Into<String>, op: TransformOp) -> Self {
        Self {
            field: field.into(),
            op,
            source: None,
            values: Vec::new(),
            separator: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_values(mut self, values: Vec<String>) -> Self {
        self.values = values;
        self
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = Some(separator.into());
        self
    }

    fn source_path(&self) -> &str {
        self.source.as_deref().unwrap_or(&self.field)
    }
}

/// Transform step configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TransformStepConfig {
    #[serde(default)]
    pub operations: Vec<TransformOperation>,
}

impl TransformStepConfig {
    /// Apply every operation; the output is the input with transformed fields set.
    ///
    /// A value that cannot be cast to a number becomes `null` with a warning.
    pub fn apply(&self, input: &Map<String, Value>) -> (Value, Vec<String>) {
        let source = Value::Object(input.clone());
        let mut output = input.clone();
        let mut warnings = Vec::new();

        for operation in &self.operations {
            let value = extract_path(&source, operation.source_path());

            let transformed = match operation.op {
                TransformOp::Uppercase => value.map(|v| Value::String(value_to_string(v).to_uppercase())),
                TransformOp::Lowercase => value.map(|v| Value::String(value_to_string(v).to_lowercase())),
                TransformOp::Number => match to_number(value) {
                    Some(number) => Some(number),
                    None => {
                        warnings.push(format!(
                            "Cannot convert field '{}' to a number, writing null",
                            operation.source_path()
                        ));
                        Some(Value::Null)
                    }
                },
                TransformOp::Concat => {
                    let separator = operation.separator.as_deref().unwrap_or("");
                    let joined = operation
                        .values
                        .iter()
                        .map(|part| match extract_path(&source, part) {
                            Some(v) => value_to_string(v),
                            None => part.clone(),
                        })
                        .collect::<Vec<_>>()
                        .join(separator);
                    Some(Value::String(joined))
                }
            };

            if let Some(transformed) = transformed {
                output.insert(operation.field.clone(), transformed);
            }
        }

        (Value::Object(output), warnings)
    }
}

fn to_number(value: Option<&Value>) -> Option<Value> {
    let parsed = match value {
        Some(Value::Number(n)) => return Some(Value::Number(n.clone())),
        Some(Value::Bool(b)) => Some(if *b { 1.0 } else { 0.0 }),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    let number = parsed.filter(|n| n.is_finite())?;

    if number.fract() == 0.0 && number.abs() < i64::MAX as f64 {
        return Some(Value::Number(Number::from(number as i64)));
    }

    Number::from_f64(number).map(Value::Number)
}

/// Condition comparison operators
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    GreaterThan,
    Contains,
}

impl ConditionOperator {
    pub fn evaluate(&self, field_value: &Value, compare_value: &Value) -> bool {
        match self {
            Self::Equals => {
                field_value == compare_value
                    || (is_scalar(field_value)
                        && is_scalar(compare_value)
                        && value_to_string(field_value) == value_to_string(compare_value))
            }
            Self::GreaterThan => match (as_f64(field_value), as_f64(compare_value)) {
                (Some(a), Some(b)) => a > b,
                _ => false,
            },
            Self::Contains => match field_value {
                Value::String(s) => s.contains(&value_to_string(compare_value)),
                Value::Array(arr) => arr.contains(compare_value),
                Value::Object(obj) => compare_value.as_str().is_some_and(|k| obj.contains_key(k)),
                _ => false,
            },
        }
    }
}

fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_))
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Condition step configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConditionStepConfig {
    /// Dotted path into the step input
    pub field: String,

    pub operator: ConditionOperator,

    #[serde(default)]
    pub value: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub true_branch: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub false_branch: Option<String>,
}

impl ConditionStepConfig {
    pub fn new(field: impl Into<String>, operator: ConditionOperator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
            true_branch: None,
            false_branch: None,
        }
    }

    /// Input merged with `{conditionMet, branch}`
    pub fn evaluate(&self, input: &Map<String, Value>) -> Value {
        let source = Value::Object(input.clone());
        let field_value = extract_path(&source, &self.field).unwrap_or(&Value::Null);
        let met = self.operator.evaluate(field_value, &self.value);

        let branch = if met {
            self.true_branch.clone().unwrap_or_else(|| "true".to_string())
        } else {
            self.false_branch.clone().unwrap_or_else(|| "false".to_string())
        };

        let mut output = input.clone();
        output.insert("conditionMet".to_string(), Value::Bool(met));
        output.insert("branch".to_string(), Value::String(branch));
        Value::Object(output)
    }
}

/// Delay step configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DelayStepConfig {
    #[serde(default)]
    pub delay_ms: u64,
}

impl DelayStepConfig {
    pub fn effective_delay_ms(&self) -> u64 {
        self.delay_ms.min(MAX_DELAY_MS)
    }
}

/// Webhook step configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WebhookStepConfig {
    #[serde(default)]
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl WebhookStepConfig {
    /// Deterministic result; no request leaves the process
    pub fn simulate(&self, input: &Map<String, Value>) -> Value {
        json!({
            "webhook": {
                "url": self.url,
                "method": self.method.clone().unwrap_or_else(|| "POST".to_string()),
                "payload": self.payload.clone().unwrap_or_else(|| Value::Object(input.clone())),
                "delivered": false,
                "simulated": true,
            }
        })
    }
}

/// Decision step configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DecisionStepConfig {
    #[serde(default)]
    pub options: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_option: Option<String>,
}

impl DecisionStepConfig {
    /// First option, else the default option
    pub fn simulate(&self) -> Value {
        let decision = self
            .options
            .first()
            .cloned()
            .or_else(|| self.default_option.clone());

        json!({
            "decision": decision,
            "options": self.options,
            "simulated": true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_step_kind_deserialization() {
        let kind: StepKind = serde_json::from_value(json!({
            "type": "PROMPT",
            "prompt_content": "Hello {{name}}",
            "models": [{"provider": "openai", "model": "gpt-4o"}],
            "routing": {"mode": "parallel"}
        }))
        .unwrap();

        assert_eq!(kind.type_name(), "PROMPT");
        match kind {
            StepKind::Prompt(config) => {
                assert_eq!(config.models.len(), 1);
                assert_eq!(config.template().map(|(t, _)| t), Some("Hello {{name}}"));
            }
            other => panic!("unexpected step kind {:?}", other),
        }
    }

    #[test]
    fn test_unknown_step_type_is_rejected() {
        let result = serde_json::from_value::<StepKind>(json!({"type": "LOOP"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_attached_prompt_takes_precedence() {
        let config = PromptStepConfig::with_content("inline")
            .with_prompt(Prompt::new("p1", "attached {{x}}").with_variable(PromptVariable::new("x")));

        let (template, declared) = config.template().unwrap();
        assert_eq!(template, "attached {{x}}");
        assert_eq!(declared.len(), 1);

        let empty = PromptStepConfig::with_content("   ");
        assert!(empty.template().is_none());
    }

    #[test]
    fn test_legacy_settings_to_model_config() {
        let settings = LegacyModelSettings {
            provider: "anthropic".to_string(),
            model: None,
            temperature: Some(0.3),
            max_tokens: Some(256),
            top_p: None,
        };

        let model = settings.to_model_config().unwrap();
        assert_eq!(model.provider, ProviderKind::Anthropic);
        assert_eq!(model.model, "claude-3-5-sonnet-latest");
        assert_eq!(model.parameters.max_tokens, Some(256));
    }

    #[test]
    fn test_transform_operations() {
        let config = TransformStepConfig {
            operations: vec![
                TransformOperation::new("name", TransformOp::Uppercase),
                TransformOperation::new("lower", TransformOp::Lowercase).with_source("title"),
                TransformOperation::new("count", TransformOp::Number),
                TransformOperation::new("full", TransformOp::Concat)
                    .with_values(vec!["name".to_string(), "-".to_string(), "title".to_string()])
                    .with_separator(" "),
            ],
        };

        let (output, warnings) =
            config.apply(&input(json!({"name": "ada", "title": "Countess", "count": "42"})));
        assert!(warnings.is_empty());

        assert_eq!(output["name"], "ADA");
        assert_eq!(output["lower"], "countess");
        assert_eq!(output["count"], 42);
        assert_eq!(output["full"], "ada - Countess");
        assert_eq!(output["title"], "Countess");
    }

    #[test]
    fn test_transform_number_writes_null_for_text() {
        let config = TransformStepConfig {
            operations: vec![TransformOperation::new("count", TransformOp::Number)],
        };

        let (output, warnings) = config.apply(&input(json!({"count": "many"})));
        assert_eq!(output["count"], Value::Null);
        assert_eq!(
            warnings,
            vec!["Cannot convert field 'count' to a number, writing null".to_string()]
        );

        let (fractional, warnings) = config.apply(&input(json!({"count": "2.5"})));
        assert_eq!(fractional["count"], 2.5);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_condition_evaluation() {
        let mut config = ConditionStepConfig::new("score", ConditionOperator::GreaterThan, json!(5));
        config.true_branch = Some("high".to_string());

        let output = config.evaluate(&input(json!({"score": "7"})));
        assert_eq!(output["conditionMet"], true);
        assert_eq!(output["branch"], "high");
        assert_eq!(output["score"], "7");

        let output = config.evaluate(&input(json!({"score": 1})));
        assert_eq!(output["conditionMet"], false);
        assert_eq!(output["branch"], "false");
    }

    #[test]
    fn test_condition_operators() {
        let op = ConditionOperator::Equals;
        assert!(op.evaluate(&json!("5"), &json!(5)));
        assert!(!op.evaluate(&json!([1]), &json!("[1]")));

        let op = ConditionOperator::Contains;
        assert!(op.evaluate(&json!("hello world"), &json!("world")));
        assert!(op.evaluate(&json!(["a", "b"]), &json!("b")));
        assert!(!op.evaluate(&json!(3), &json!(3)));
    }

    #[test]
    fn test_delay_is_capped() {
        let config = DelayStepConfig { delay_ms: 10_000_000 };
        assert_eq!(config.effective_delay_ms(), MAX_DELAY_MS);
    }

    #[test]
    fn test_simulated_steps_are_deterministic() {
        let webhook = WebhookStepConfig {
            url: "https://hooks.example.com".to_string(),
            ..Default::default()
        };
        let first = webhook.simulate(&input(json!({"a": 1})));
        assert_eq!(first, webhook.simulate(&input(json!({"a": 1}))));
        assert_eq!(first["webhook"]["method"], "POST");

        let decision = DecisionStepConfig {
            options: vec![],
            default_option: Some("fallback".to_string()),
        };
        assert_eq!(decision.simulate()["decision"], "fallback");
    }
}
