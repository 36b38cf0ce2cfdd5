//! `{{name}}` textual variable substitution.
//!
//! Purely textual and recursive: strings are templated, map values and
//! sequence elements are templated in place (map keys are untouched), and
//! other scalars pass through unchanged. An unresolved `{{name}}` token is
//! left intact rather than removed, so a typo'd variable name is visible
//! in the rendered output instead of silently vanishing.

use serde_json::Value;
use std::collections::HashMap;

/// Expand every `{{name}}` occurrence in `input` using `vars`, leaving
/// unknown names untouched.
pub fn substitute_str(input: &str, vars: &HashMap<String, Value>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    loop {
        match rest.find("{{") {
            None => {
                out.push_str(rest);
                break;
            }
            Some(start) => {
                let Some(end_rel) = rest[start..].find("}}") else {
                    out.push_str(rest);
                    break;
                };
                let end = start + end_rel;
                let name = rest[start + 2..end].trim();

                out.push_str(&rest[..start]);
                match vars.get(name) {
                    Some(value) => out.push_str(&printed_form(value)),
                    None => out.push_str(&rest[start..end + 2]),
                }
                rest = &rest[end + 2..];
            }
        }
    }

    out
}

/// Printed form used when a value is spliced into templated text.
fn printed_form(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Apply [`substitute_str`] recursively over an arbitrary JSON value.
pub fn substitute_value(value: &Value, vars: &HashMap<String, Value>) -> Value {
    match value {
        Value::String(s) => Value::String(substitute_str(s, vars)),
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| substitute_value(v, vars)).collect())
        }
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute_value(v, vars)))
                .collect(),
        ),
        other => other.clone(),
    }
}
