use serde_json::Value;

/// Gets a value from a JSON document using a simple path notation.
///
/// Supports:
/// - `` (empty) or `$` - the document itself
/// - `field` - direct field access
/// - `field.nested` - nested field access
/// - `field[0]` - array index access
/// - `[0].field` - index into a top-level array
pub fn get<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let path = path.trim();
    let path = path.strip_prefix('$').unwrap_or(path);
    let path = path.strip_prefix('.').unwrap_or(path);
    if path.is_empty() {
        return Some(value);
    }

    let mut current = value;
    for part in path.split('.') {
        current = step(current, part)?;
    }
    Some(current)
}

fn step<'a>(value: &'a Value, part: &str) -> Option<&'a Value> {
    let Some(bracket_pos) = part.find('[') else {
        return value.get(part);
    };

    let field_name = &part[..bracket_pos];
    let mut current = if field_name.is_empty() {
        value
    } else {
        value.get(field_name)?
    };

    // `field[0][1]` indexes repeatedly
    let mut rest = &part[bracket_pos..];
    while let Some(inner) = rest.strip_prefix('[') {
        let close = inner.find(']')?;
        let index: usize = inner[..close].trim().parse().ok()?;
        current = current.get(index)?;
        rest = &inner[close + 1..];
    }
    rest.is_empty().then_some(current)
}

/// Describes a JSON value's type for failure messages.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
