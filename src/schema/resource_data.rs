//! Resource state container
//!
//! `ResourceData` is the attribute bag passed through every lifecycle
//! callback: an optional id plus attribute values keyed by schema name.
//! Absent and `null` attributes read back as the zero value of their type.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Attribute values and id of a single resource or data source instance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(flatten)]
    attributes: Map<String, Value>,
}

impl ResourceData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON object; `null` yields an empty instance
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::new()),
            Value::Object(_) => Ok(serde_json::from_value(value)?),
            other => Err(Error::Validation(format!(
                "resource state must be an object, got {}",
                other
            ))),
        }
    }

    pub fn into_value(self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.set_id(id);
        self
    }

    /// The resource id; an empty id counts as unset
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = Some(id.into());
    }

    /// Mark the remote object as gone
    pub fn clear_id(&mut self) {
        self.id = None;
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key).filter(|v| !v.is_null())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn get_string(&self, key: &str) -> String {
        match self.get(key) {
            Some(Value::String(s)) => s.clone(),
            _ => String::new(),
        }
    }

    pub fn get_bool(&self, key: &str) -> bool {
        matches!(self.get(key), Some(Value::Bool(true)))
    }

    /// Read a string map; scalar values are stringified
    pub fn get_string_map(&self, key: &str) -> BTreeMap<String, String> {
        let Some(Value::Object(map)) = self.get(key) else {
            return BTreeMap::new();
        };

        map.iter()
            .filter_map(|(k, v)| {
                let value = match v {
                    Value::String(s) => s.clone(),
                    Value::Bool(b) => b.to_string(),
                    Value::Number(n) => n.to_string(),
                    _ => return None,
                };
                Some((k.clone(), value))
            })
            .collect()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn set_string_map(&mut self, key: impl Into<String>, map: &BTreeMap<String, String>) {
        let object: Map<String, Value> = map
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        self.attributes.insert(key.into(), Value::Object(object));
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.attributes.remove(key)
    }

    /// Attribute names present in this instance, including `null` ones
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.attributes.keys()
    }

    pub(crate) fn raw(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }
}
