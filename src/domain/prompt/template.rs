//! Prompt template resolution
//!
//! Placeholders use the `{{name}}` syntax; whitespace inside the braces is
//! tolerated (`{{ name }}`). Declared variables resolve in priority order:
//! caller input, step variable mapping, declared default, empty string.
//! Leftover placeholders are then filled from the input bag, then the mapping.
//! Anything still unresolved stays in the text and produces a warning.

use std::collections::{BTreeMap, BTreeSet};

use once_cell::sync::Lazy;
use regex::{NoExpand, Regex};
use serde_json::{Map, Value};

use super::PromptVariable;

/// Matches any remaining `{{ ... }}` placeholder
static PLACEHOLDER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([^{}]*?)\s*\}\}").expect("valid placeholder pattern"));

/// Outcome of resolving one template
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateResolution {
    /// Template text after substitution
    pub text: String,

    /// Value chosen for each declared variable
    pub values: BTreeMap<String, Value>,

    /// Distinct placeholder names left in `text`
    pub unresolved: Vec<String>,

    pub warnings: Vec<String>,
}

/// Resolve declared variables and leftover placeholders in `template`
pub fn resolve_template(
    template: &str,
    declared: &[PromptVariable],
    input: &Map<String, Value>,
    mapping: &Map<String, Value>,
) -> TemplateResolution {
    let mut text = template.to_string();
    let mut values = BTreeMap::new();

    for variable in declared {
        let name = variable.name.trim();
        if name.is_empty() {
            continue;
        }

        let value = present(input.get(name))
            .or_else(|| present(mapping.get(name)))
            .or_else(|| present(variable.default.as_ref()))
            .cloned()
            .unwrap_or_else(|| Value::String(String::new()));

        text = substitute(&text, name, &value_to_string(&value));
        values.insert(name.to_string(), value);
    }

    // Second pass for undeclared placeholders
    let leftovers: BTreeSet<String> = placeholder_names(&text);
    for name in leftovers {
        let value = present(input.get(name.as_str())).or_else(|| present(mapping.get(name.as_str())));
        if let Some(value) = value {
            text = substitute(&text, &name, &value_to_string(value));
        }
    }

    let unresolved: Vec<String> = placeholder_names(&text).into_iter().collect();
    let warnings = unresolved
        .iter()
        .map(|name| format!("Unresolved template variable: {}", name))
        .collect();

    TemplateResolution {
        text,
        values,
        unresolved,
        warnings,
    }
}

/// Convert a JSON value to the text inserted into a prompt
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),

        // For arrays and objects, use JSON representation
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

fn placeholder_names(text: &str) -> BTreeSet<String> {
    PLACEHOLDER_PATTERN
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

/// Replace every `{{name}}` occurrence with `replacement`, inserted literally
fn substitute(text: &str, name: &str, replacement: &str) -> String {
    let pattern = format!(r"\{{\{{\s*{}\s*\}}\}}", regex::escape(name));

    match Regex::new(&pattern) {
        Ok(re) => re.replace_all(text, NoExpand(replacement)).into_owned(),
        Err(_) => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_input_wins_over_mapping_and_default() {
        let declared = vec![PromptVariable::with_default("topic", "cats")];
        let result = resolve_template(
            "Write about {{topic}}.",
            &declared,
            &map(json!({"topic": "dogs"})),
            &map(json!({"topic": "birds"})),
        );

        assert_eq!(result.text, "Write about dogs.");
        assert_eq!(result.values.get("topic"), Some(&json!("dogs")));
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_mapping_then_default_then_empty() {
        let declared = vec![
            PromptVariable::new("a"),
            PromptVariable::with_default("b", "bee"),
            PromptVariable::new("c"),
        ];
        let result = resolve_template(
            "[{{a}}|{{ b }}|{{c}}]",
            &declared,
            &map(json!({"a": null})),
            &map(json!({"a": "ay"})),
        );

        assert_eq!(result.text, "[ay|bee|]");
    }

    #[test]
    fn test_replaces_every_occurrence() {
        let declared = vec![PromptVariable::new("name")];
        let result = resolve_template(
            "{{name}} and {{  name  }} again",
            &declared,
            &map(json!({"name": "Ada"})),
            &Map::new(),
        );

        assert_eq!(result.text, "Ada and Ada again");
    }

    #[test]
    fn test_second_pass_uses_input_bag() {
        let result = resolve_template(
            "Previous: {{previousGeneratedText}}; count {{count}}",
            &[],
            &map(json!({"previousGeneratedText": "hello", "count": 3})),
            &Map::new(),
        );

        assert_eq!(result.text, "Previous: hello; count 3");
    }

    #[test]
    fn test_non_string_values_are_json_encoded() {
        let declared = vec![PromptVariable::new("items")];
        let result = resolve_template(
            "Items: {{items}}",
            &declared,
            &map(json!({"items": ["a", 1]})),
            &Map::new(),
        );

        assert_eq!(result.text, r#"Items: ["a",1]"#);
    }

    #[test]
    fn test_unresolved_placeholders_warn_once() {
        let result = resolve_template("{{missing}} {{missing}} {{other}}", &[], &Map::new(), &Map::new());

        assert_eq!(result.text, "{{missing}} {{missing}} {{other}}");
        assert_eq!(result.unresolved, vec!["missing", "other"]);
        assert_eq!(
            result.warnings,
            vec![
                "Unresolved template variable: missing",
                "Unresolved template variable: other"
            ]
        );
    }

    #[test]
    fn test_dollar_signs_are_inserted_literally() {
        let declared = vec![PromptVariable::new("price")];
        let result = resolve_template(
            "Cost: {{price}}",
            &declared,
            &map(json!({"price": "$1 and $0"})),
            &Map::new(),
        );

        assert_eq!(result.text, "Cost: $1 and $0");
    }

    #[test]
    fn test_regex_metacharacters_in_names() {
        let declared = vec![PromptVariable::new("a.b+c")];
        let result = resolve_template(
            "{{a.b+c}} {{aXb+c}}",
            &declared,
            &map(json!({"a.b+c": "ok"})),
            &Map::new(),
        );

        assert_eq!(result.text, "ok {{aXb+c}}");
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let declared = vec![PromptVariable::new("x")];
        let input = map(json!({"x": "value"}));

        let first = resolve_template("Say {{x}}", &declared, &input, &Map::new());
        let second = resolve_template(&first.text, &declared, &input, &Map::new());

        assert_eq!(first.text, second.text);
        assert!(second.warnings.is_empty());
    }
}
