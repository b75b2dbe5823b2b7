//! Config template rendering against the live input payload.
//!
//! String config values may reference payload or environment keys with
//! `{name}`. Rendering happens at invocation time, never at compile time.
//! A string that is exactly one placeholder substitutes the raw JSON value;
//! anywhere else the value is stringified into the surrounding text.
//! `{{` and `}}` escape literal braces.

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::errors::TemplateBindingError;

/// Whether a string contains any unescaped placeholder.
pub fn has_template(text: &str) -> bool {
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
            }
            '{' => return true,
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
            }
            _ => {}
        }
    }
    false
}

/// Renders one config value against the input payload and the ambient
/// environment. Input keys shadow environment keys. Non-string values pass
/// through untouched; nested arrays and objects are rendered recursively.
pub fn render_value(
    value: &Value,
    input: &FxHashMap<String, Value>,
    environment: &FxHashMap<String, Value>,
    scope: &str,
) -> Result<Value, TemplateBindingError> {
    match value {
        Value::String(text) => render_str(text, input, environment, scope),
        Value::Array(items) => items
            .iter()
            .map(|item| render_value(item, input, environment, scope))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| Ok((k.clone(), render_value(v, input, environment, scope)?)))
            .collect::<Result<serde_json::Map<_, _>, _>>()
            .map(Value::Object),
        other => Ok(other.clone()),
    }
}

fn render_str(
    text: &str,
    input: &FxHashMap<String, Value>,
    environment: &FxHashMap<String, Value>,
    scope: &str,
) -> Result<Value, TemplateBindingError> {
    // Whole-string placeholder: substitute the raw value, preserving type.
    if let Some(name) = whole_placeholder(text) {
        return lookup(name, input, environment, scope).cloned();
    }

    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut name = String::new();
                for inner in chars.by_ref() {
                    if inner == '}' {
                        break;
                    }
                    name.push(inner);
                }
                let value = lookup(&name, input, environment, scope)?;
                out.push_str(&stringify(value));
            }
            _ => out.push(c),
        }
    }
    Ok(Value::String(out))
}

/// `"{name}"` and nothing else, with a non-empty name free of braces.
fn whole_placeholder(text: &str) -> Option<&str> {
    let name = text.strip_prefix('{')?.strip_suffix('}')?;
    if name.is_empty() || name.contains(['{', '}']) {
        return None;
    }
    Some(name)
}

fn lookup<'a>(
    name: &str,
    input: &'a FxHashMap<String, Value>,
    environment: &'a FxHashMap<String, Value>,
    scope: &str,
) -> Result<&'a Value, TemplateBindingError> {
    input
        .get(name)
        .or_else(|| environment.get(name))
        .ok_or_else(|| TemplateBindingError {
            variable: name.to_string(),
            scope: scope.to_string(),
        })
}

/// Embeds a value into surrounding text. Bare strings render without
/// quotes; everything else uses compact JSON.
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
