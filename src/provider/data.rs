//! Typed access to resource and data source state.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::plan::ID_ATTRIBUTE;

/// Attribute values of one resource instance, data source lookup or nested
/// block item, plus its identity.
///
/// Getters treat an absent attribute and a JSON `null` the same way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceData {
    id: String,
    values: Map<String, Value>,
}

impl ResourceData {
    /// Empty data with no identity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Data carrying only an identity, as used by import.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            values: Map::new(),
        }
    }

    /// Wrap a state or configuration object. The `id` attribute, when it is
    /// a string, becomes the identity. Non-object values give empty data.
    pub fn from_state(state: Value) -> Self {
        let mut values = match state {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let id = match values.remove(ID_ATTRIBUTE) {
            Some(Value::String(id)) => id,
            _ => String::new(),
        };
        Self { id, values }
    }

    /// The remote identity; empty when the object does not exist.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Set the remote identity. An empty id marks the object as gone.
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
    }

    /// Raw value of an attribute, `None` when absent or null.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key).filter(|v| !v.is_null())
    }

    /// String value of an attribute, empty when unset.
    pub fn get_str(&self, key: &str) -> &str {
        self.get(key).and_then(Value::as_str).unwrap_or_default()
    }

    /// String value of an attribute when it is set to something non-empty.
    pub fn get_ok_str(&self, key: &str) -> Option<&str> {
        self.get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Boolean value of an attribute, `default` when unset.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get(key).and_then(Value::as_bool).unwrap_or(default)
    }

    /// String elements of a list or set attribute.
    pub fn get_string_list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// String entries of a map attribute.
    pub fn get_string_map(&self, key: &str) -> BTreeMap<String, String> {
        self.get(key)
            .and_then(Value::as_object)
            .map(|map| {
                map.iter()
                    .filter_map(|(k, v)| Some((k.clone(), v.as_str()?.to_owned())))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Items of a nested list or set block.
    pub fn get_blocks(&self, key: &str) -> Vec<ResourceData> {
        self.get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|item| Self {
                        id: String::new(),
                        values: item.as_object().cloned().unwrap_or_default(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Set an attribute.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// Set a list or set attribute from strings.
    pub fn set_strings<I, S>(&mut self, key: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: Vec<Value> = values.into_iter().map(|s| Value::String(s.into())).collect();
        self.values.insert(key.into(), Value::Array(values));
    }

    /// Set a nested block attribute from block items.
    pub fn set_blocks(&mut self, key: impl Into<String>, blocks: Vec<ResourceData>) {
        let items = blocks.into_iter().map(ResourceData::into_value).collect();
        self.values.insert(key.into(), Value::Array(items));
    }

    /// Convert into state for the plugin host. Data without an identity
    /// becomes `null`, which tells the host the object is gone.
    pub fn into_state(self) -> Value {
        if self.id.is_empty() {
            return Value::Null;
        }
        let mut values = self.values;
        values.insert(ID_ATTRIBUTE.to_string(), Value::String(self.id));
        Value::Object(values)
    }

    /// The attribute object without identity handling, as used for nested
    /// block items.
    pub fn into_value(self) -> Value {
        Value::Object(self.values)
    }
}
