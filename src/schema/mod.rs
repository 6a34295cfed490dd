//! Declarative Schema
//!
//! Describes the attributes of resources and data sources, validates
//! configuration against them, and computes plans between prior and
//! proposed state.

pub mod resource_data;

pub use resource_data::ResourceData;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// =============================================================================
// Attribute
// =============================================================================

/// Value type of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Bool,
    /// Map of string to string
    Map,
}

impl ValueType {
    fn zero(&self) -> Value {
        match self {
            ValueType::String => Value::String(String::new()),
            ValueType::Bool => Value::Bool(false),
            ValueType::Map => Value::Object(Default::default()),
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (ValueType::String, Value::String(_)) => true,
            (ValueType::Bool, Value::Bool(_)) => true,
            (ValueType::Map, Value::Object(map)) => map
                .values()
                .all(|v| matches!(v, Value::String(_) | Value::Number(_) | Value::Bool(_))),
            _ => false,
        }
    }
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueType::String => write!(f, "string"),
            ValueType::Bool => write!(f, "bool"),
            ValueType::Map => write!(f, "map"),
        }
    }
}

/// Schema entry for one attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    #[serde(rename = "type")]
    pub value_type: ValueType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub computed: bool,
    /// Changing the value requires replacing the remote object
    #[serde(default)]
    pub force_new: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Attribute {
    fn of(value_type: ValueType) -> Self {
        Self {
            value_type,
            required: false,
            optional: false,
            computed: false,
            force_new: false,
            description: None,
        }
    }

    pub fn string() -> Self {
        Self::of(ValueType::String)
    }

    pub fn bool() -> Self {
        Self::of(ValueType::Bool)
    }

    pub fn map() -> Self {
        Self::of(ValueType::Map)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Whether configuration may set this attribute
    pub fn is_configurable(&self) -> bool {
        self.required || self.optional
    }
}

// =============================================================================
// Schema
// =============================================================================

/// Attribute set of a resource or data source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub version: u64,
    pub attributes: BTreeMap<String, Attribute>,
}

/// Result of planning a change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanResult {
    pub planned_state: ResourceData,
    /// Attributes whose value differs from the prior state
    pub changed: Vec<String>,
    /// Changed attributes that force replacement
    pub requires_replace: Vec<String>,
}

impl PlanResult {
    pub fn has_changes(&self) -> bool {
        !self.changed.is_empty()
    }

    pub fn requires_replacement(&self) -> bool {
        !self.requires_replace.is_empty()
    }
}

impl Schema {
    pub fn v0() -> Self {
        Self::default()
    }

    pub fn with_attribute(mut self, name: impl Into<String>, attribute: Attribute) -> Self {
        self.attributes.insert(name.into(), attribute);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    /// Check configuration against the schema, reporting every problem at once
    pub fn validate(&self, config: &ResourceData) -> Result<()> {
        let mut problems = Vec::new();

        for key in config.keys() {
            if key == "id" {
                continue;
            }
            let Some(attribute) = self.attributes.get(key) else {
                problems.push(format!("unsupported attribute \"{}\"", key));
                continue;
            };

            let Some(value) = config.raw(key) else {
                continue;
            };
            if !attribute.value_type.accepts(value) {
                problems.push(format!(
                    "attribute \"{}\" must be a {}",
                    key, attribute.value_type
                ));
            } else if !value.is_null() && !attribute.is_configurable() {
                problems.push(format!("attribute \"{}\" is read-only", key));
            }
        }

        for (name, attribute) in &self.attributes {
            if attribute.required && !config.contains(name) {
                problems.push(format!("missing required attribute \"{}\"", name));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(problems.join("; ")))
        }
    }

    /// Compute the planned state and the attributes that change
    ///
    /// Computed attributes left unset in the proposed state keep their prior
    /// value; other unset attributes take their type's zero value.
    pub fn plan(&self, prior: Option<&ResourceData>, proposed: &ResourceData) -> PlanResult {
        let mut planned = proposed.clone();
        if let Some(id) = prior.and_then(ResourceData::id) {
            planned.set_id(id);
        }

        for (name, attribute) in &self.attributes {
            if planned.contains(name) {
                continue;
            }
            match prior.and_then(|p| p.get(name)) {
                Some(value) if attribute.computed => planned.set(name.clone(), value.clone()),
                _ if attribute.computed => {}
                _ => planned.set(name.clone(), attribute.value_type.zero()),
            }
        }

        let mut changed = Vec::new();
        let mut requires_replace = Vec::new();

        for (name, attribute) in &self.attributes {
            let after = planned.get(name).cloned().unwrap_or_else(|| attribute.value_type.zero());
            let differs = match prior {
                Some(prior) => {
                    let before = prior
                        .get(name)
                        .cloned()
                        .unwrap_or_else(|| attribute.value_type.zero());
                    before != after
                }
                None => planned.contains(name) && after != attribute.value_type.zero(),
            };

            if differs {
                changed.push(name.clone());
                if prior.is_some() && attribute.force_new {
                    requires_replace.push(name.clone());
                }
            }
        }

        PlanResult {
            planned_state: planned,
            changed,
            requires_replace,
        }
    }
}
