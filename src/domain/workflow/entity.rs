//! Workflow definition, variables and steps

use std::collections::{BTreeMap, HashMap};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::error::WorkflowError;
use super::step_types::StepKind;
use crate::domain::prompt::value_to_string;

/// Role a declared variable plays in the workflow
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum VariableRole {
    #[default]
    Input,
    Output,
    Intermediate,
}

/// Declared data type of a workflow variable
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    #[default]
    String,
    Number,
    Boolean,
    Object,
    Array,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        }
    }

    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
        }
    }

    /// Sample value used by preview when nothing else is available
    pub fn placeholder(&self, name: &str) -> Value {
        match self {
            Self::String => Value::String(format!("Sample {}", name)),
            Self::Number => json!(0),
            Self::Boolean => Value::Bool(false),
            Self::Object => json!({}),
            Self::Array => json!([]),
        }
    }
}

/// Optional constraints checked on input values
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ValidationRules {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed: Vec<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl ValidationRules {
    pub fn check(&self, name: &str, value: &Value) -> Result<(), WorkflowError> {
        let length = match value {
            Value::String(s) => Some(s.chars().count()),
            Value::Array(a) => Some(a.len()),
            _ => None,
        };

        if let (Some(len), Some(min)) = (length, self.min_length) {
            if len < min {
                return Err(WorkflowError::validation(format!(
                    "Variable '{}' must have at least {} characters",
                    name, min
                )));
            }
        }

        if let (Some(len), Some(max)) = (length, self.max_length) {
            if len > max {
                return Err(WorkflowError::validation(format!(
                    "Variable '{}' must have at most {} characters",
                    name, max
                )));
            }
        }

        if let (Some(pattern), Value::String(s)) = (&self.pattern, value) {
            let re = Regex::new(pattern).map_err(|e| {
                WorkflowError::validation(format!(
                    "Variable '{}' has an invalid pattern: {}",
                    name, e
                ))
            })?;
            if !re.is_match(s) {
                return Err(WorkflowError::validation(format!(
                    "Variable '{}' does not match pattern '{}'",
                    name, pattern
                )));
            }
        }

        if !self.allowed.is_empty() && !self.allowed.contains(value) {
            let allowed: Vec<String> = self.allowed.iter().map(value_to_string).collect();
            return Err(WorkflowError::validation(format!(
                "Variable '{}' must be one of: {}",
                name,
                allowed.join(", ")
            )));
        }

        if let Some(n) = value.as_f64() {
            if self.min.is_some_and(|min| n < min) || self.max.is_some_and(|max| n > max) {
                return Err(WorkflowError::validation(format!(
                    "Variable '{}' is out of range",
                    name
                )));
            }
        }

        Ok(())
    }
}

/// A variable declared on the workflow
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowVariable {
    pub name: String,

    #[serde(default)]
    pub role: VariableRole,

    #[serde(default)]
    pub data_type: DataType,

    #[serde(default)]
    pub required: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationRules>,
}

impl WorkflowVariable {
    pub fn input(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            role: VariableRole::Input,
            data_type,
            required: false,
            default: None,
            validation: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_validation(mut self, rules: ValidationRules) -> Self {
        self.validation = Some(rules);
        self
    }

    /// Check declared type and validation rules
    pub fn validate(&self, value: &Value) -> Result<(), WorkflowError> {
        if !self.data_type.matches(value) {
            return Err(WorkflowError::validation(format!(
                "Variable '{}' must be of type {}",
                self.name,
                self.data_type.as_str()
            )));
        }

        match self.validation {
            Some(ref rules) => rules.check(&self.name, value),
            None => Ok(()),
        }
    }
}

/// A step within a workflow
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Step {
    #[serde(default)]
    pub id: String,

    pub name: String,

    /// Ascending execution order, unique within the workflow
    pub order: i32,

    /// The step type and configuration
    #[serde(flatten)]
    pub kind: StepKind,

    /// Export aliases: alias -> dotted path into the raw output
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, String>,
}

impl Step {
    pub fn new(id: impl Into<String>, name: impl Into<String>, order: i32, kind: StepKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            order,
            kind,
            outputs: BTreeMap::new(),
        }
    }

    pub fn with_output(mut self, alias: impl Into<String>, path: impl Into<String>) -> Self {
        self.outputs.insert(alias.into(), path.into());
        self
    }

    /// Identifier used in traces and errors; falls back to the name
    pub fn display_id(&self) -> &str {
        if self.id.is_empty() {
            &self.name
        } else {
            &self.id
        }
    }
}

/// Immutable definition of a workflow for the duration of a run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowDefinition {
    pub id: String,

    #[serde(default)]
    pub owner_id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub steps: Vec<Step>,

    #[serde(default)]
    pub variables: Vec<WorkflowVariable>,
}

impl WorkflowDefinition {
    pub fn new(id: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            name: String::new(),
            steps: Vec::new(),
            variables: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_variable(mut self, variable: WorkflowVariable) -> Self {
        self.variables.push(variable);
        self
    }

    /// Steps sorted by ascending order; duplicate order values are rejected
    pub fn ordered_steps(&self) -> Result<Vec<&Step>, WorkflowError> {
        let mut seen: HashMap<i32, &Step> = HashMap::new();

        for step in &self.steps {
            if let Some(existing) = seen.insert(step.order, step) {
                return Err(WorkflowError::duplicate_step_order(
                    step.order,
                    &existing.name,
                    &step.name,
                ));
            }
        }

        let mut steps: Vec<&Step> = self.steps.iter().collect();
        steps.sort_by_key(|s| s.order);
        Ok(steps)
    }

    pub fn input_variables(&self) -> impl Iterator<Item = &WorkflowVariable> {
        self.variables
            .iter()
            .filter(|v| v.role == VariableRole::Input)
    }

    /// Apply defaults and validate declared inputs.
    ///
    /// With `fill_placeholders`, a missing required input gets a sample
    /// value and a warning instead of failing.
    pub fn prepare_input(
        &self,
        input: &Map<String, Value>,
        fill_placeholders: bool,
    ) -> Result<(Map<String, Value>, Vec<String>), WorkflowError> {
        let mut prepared = input.clone();
        let mut warnings = Vec::new();

        for variable in self.input_variables() {
            let missing = prepared.get(&variable.name).is_none_or(Value::is_null);

            if missing {
                if let Some(ref default) = variable.default {
                    prepared.insert(variable.name.clone(), default.clone());
                } else if variable.required {
                    if !fill_placeholders {
                        return Err(WorkflowError::validation(format!(
                            "Missing required input variable '{}'",
                            variable.name
                        )));
                    }
                    prepared.insert(
                        variable.name.clone(),
                        variable.data_type.placeholder(&variable.name),
                    );
                    warnings.push(format!(
                        "Input '{}' was not provided; using a sample value",
                        variable.name
                    ));
                    continue;
                } else {
                    continue;
                }
            }

            if let Some(value) = prepared.get(&variable.name) {
                variable.validate(value)?;
            }
        }

        Ok((prepared, warnings))
    }
}
