//! `{{placeholder}}` resolution for paths, headers and JSON bodies.
//!
//! Names are looked up through a [`Lookup`] implementation. Names starting
//! with `$` are builtins:
//!
//! - `{{$uuid}}` a random UUID v4
//! - `{{$suffix}}` a random number in `1000..=9999`, for unique titles and
//!   e-mail addresses
//! - `{{$token:<identity>}}` the bearer token of a registered identity (the
//!   runner supplies these through its lookup)
//!
//! Unlike plain string interpolation, an unresolved placeholder is an error.
//! It always means the scenario is wrong, never that the service is.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::error::TemplateError;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Prefix of the per-identity token builtin.
pub const TOKEN_PREFIX: &str = "$token:";

/// Source of placeholder values.
pub trait Lookup {
    fn lookup(&self, name: &str) -> Option<Value>;
}

impl Lookup for BTreeMap<String, Value> {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

impl Lookup for BTreeMap<String, String> {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.get(name).cloned().map(Value::String)
    }
}

/// Returns the names of all placeholders in `text`, in order of appearance.
pub fn placeholders(text: &str) -> Result<Vec<String>, TemplateError> {
    let mut names = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find(OPEN) {
        let after = &rest[start + OPEN.len()..];
        let end = after
            .find(CLOSE)
            .ok_or_else(|| TemplateError::Unterminated(text.to_string()))?;
        let name = after[..end].trim();
        if name.is_empty() {
            return Err(TemplateError::Empty(text.to_string()));
        }
        names.push(name.to_string());
        rest = &after[end + CLOSE.len()..];
    }

    Ok(names)
}

/// Collects placeholder names from every string inside a JSON value.
pub fn value_placeholders(value: &Value, into: &mut BTreeSet<String>) -> Result<(), TemplateError> {
    match value {
        Value::String(text) => into.extend(placeholders(text)?),
        Value::Array(items) => {
            for item in items {
                value_placeholders(item, into)?;
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                value_placeholders(item, into)?;
            }
        }
        _ => {}
    }
    Ok(())
}

pub fn is_builtin(name: &str) -> bool {
    name.starts_with('$')
}

/// Generated builtins; `None` for anything that is not one.
fn generate(name: &str) -> Option<Value> {
    match name {
        "$uuid" => Some(Value::String(uuid::Uuid::new_v4().to_string())),
        "$suffix" => {
            let n = uuid::Uuid::new_v4().as_u128() % 9000 + 1000;
            Some(Value::String(n.to_string()))
        }
        _ => None,
    }
}

/// Whether `name` is a generator builtin that needs no lookup.
pub fn is_generator(name: &str) -> bool {
    matches!(name, "$uuid" | "$suffix")
}

fn resolve(name: &str, lookup: &dyn Lookup) -> Result<Value, TemplateError> {
    if let Some(value) = lookup.lookup(name) {
        return Ok(value);
    }
    if let Some(value) = generate(name) {
        return Ok(value);
    }
    if is_builtin(name) && !name.starts_with(TOKEN_PREFIX) {
        return Err(TemplateError::UnknownBuiltin(name.to_string()));
    }
    Err(TemplateError::Unresolved(name.to_string()))
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Substitutes every placeholder in `text` with the textual form of its value.
pub fn render_str<L: Lookup>(text: &str, lookup: &L) -> Result<String, TemplateError> {
    render_str_dyn(text, lookup)
}

fn render_str_dyn(text: &str, lookup: &dyn Lookup) -> Result<String, TemplateError> {
    let mut result = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find(OPEN) {
        result.push_str(&rest[..start]);
        let after = &rest[start + OPEN.len()..];
        let end = after
            .find(CLOSE)
            .ok_or_else(|| TemplateError::Unterminated(text.to_string()))?;
        let name = after[..end].trim();
        if name.is_empty() {
            return Err(TemplateError::Empty(text.to_string()));
        }
        result.push_str(&as_text(&resolve(name, lookup)?));
        rest = &after[end + CLOSE.len()..];
    }
    result.push_str(rest);

    Ok(result)
}

/// Resolves placeholders inside a JSON value.
///
/// A string that is exactly one placeholder is replaced by the looked-up
/// value with its JSON type intact, so `"{{price}}"` can become `99.99`.
/// Object keys are left alone.
pub fn render_value<L: Lookup>(value: &Value, lookup: &L) -> Result<Value, TemplateError> {
    render_value_dyn(value, lookup)
}

fn render_value_dyn(value: &Value, lookup: &dyn Lookup) -> Result<Value, TemplateError> {
    match value {
        Value::String(text) => {
            if let Some(name) = sole_placeholder(text) {
                return resolve(name, lookup);
            }
            Ok(Value::String(render_str_dyn(text, lookup)?))
        }
        Value::Array(items) => items
            .iter()
            .map(|item| render_value_dyn(item, lookup))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut rendered = serde_json::Map::with_capacity(map.len());
            for (key, item) in map {
                rendered.insert(key.clone(), render_value_dyn(item, lookup)?);
            }
            Ok(Value::Object(rendered))
        }
        other => Ok(other.clone()),
    }
}

fn sole_placeholder(text: &str) -> Option<&str> {
    let inner = text.strip_prefix(OPEN)?.strip_suffix(CLOSE)?;
    if inner.contains(OPEN) || inner.contains(CLOSE) {
        return None;
    }
    let name = inner.trim();
    (!name.is_empty()).then_some(name)
}
