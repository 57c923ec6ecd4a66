use std::collections::BTreeMap;

use serde_json::Value;

use crate::template::Lookup;

/// Values extracted from earlier responses, keyed by logical name.
///
/// Created empty when a scenario starts and dropped when it ends.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SharedState {
    values: BTreeMap<String, Value>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes `value` under `key`; a later step may overwrite it.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl Lookup for SharedState {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.values.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template;
    use serde_json::json;

    #[test]
    fn later_writes_overwrite() {
        let mut state = SharedState::new();
        assert!(state.is_empty());
        state.insert("categoryId", json!("a"));
        state.insert("categoryId", json!("b"));
        assert_eq!(state.len(), 1);
        assert_eq!(state.get("categoryId"), Some(&json!("b")));
    }

    #[test]
    fn feeds_templates() {
        let mut state = SharedState::new();
        state.insert("id", json!("65a1"));
        assert_eq!(template::render_str("category/{{id}}", &state).unwrap(), "category/65a1");
        assert!(template::render_str("book/{{bookId}}", &state).is_err());
    }
}
