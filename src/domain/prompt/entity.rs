//! Prompt record attached to a prompt step

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A variable declared by a prompt template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptVariable {
    pub name: String,

    /// Used when neither the caller nor the step mapping provides a value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl PromptVariable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
        }
    }

    pub fn with_default(name: impl Into<String>, default: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            default: Some(default.into()),
        }
    }
}

/// Reusable prompt template with declared variables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub name: String,

    /// Template text containing `{{name}}` placeholders
    pub content: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<PromptVariable>,
}

impl Prompt {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            content: content.into(),
            variables: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_variable(mut self, variable: PromptVariable) -> Self {
        self.variables.push(variable);
        self
    }

    pub fn has_content(&self) -> bool {
        !self.content.trim().is_empty()
    }
}
