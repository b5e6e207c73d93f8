//! Prompt domain - attached prompt records and `{{variable}}` template resolution

mod entity;
mod template;

pub use entity::{Prompt, PromptVariable};
pub use template::{resolve_template, value_to_string, TemplateResolution};
