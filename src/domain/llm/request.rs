use serde::{Deserialize, Serialize};

use super::Message;

/// Canonical prompt sent to every model of a dispatch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptRequest {
    /// Fully resolved user prompt
    pub prompt: String,

    /// Optional system instructions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

impl PromptRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            instructions: None,
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        let instructions = instructions.into();
        if !instructions.trim().is_empty() {
            self.instructions = Some(instructions);
        }
        self
    }

    /// Chat-style message list: optional system message followed by the prompt
    pub fn messages(&self) -> Vec<Message> {
        let mut messages = Vec::with_capacity(2);

        if let Some(ref instructions) = self.instructions {
            messages.push(Message::system(instructions));
        }

        messages.push(Message::user(&self.prompt));
        messages
    }
}
