//! Graph subjects and updates.
//!
//! A subject is a JSON-LD style node: an `@id`, an optional `@type` and a
//! map of properties. Every property is a set of values; a single value is
//! serialized bare and several values as an array. References to other
//! subjects are `{"@id": ...}` objects.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A node in a domain graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "@type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(flatten)]
    pub properties: BTreeMap<String, Value>,
}

impl Subject {
    /// A subject with only an identity.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: None,
            properties: BTreeMap::new(),
        }
    }

    /// A typed subject.
    pub fn typed(id: impl Into<String>, kind: &str) -> Self {
        Self {
            kind: Some(kind.to_string()),
            ..Self::new(id)
        }
    }

    /// Builder: add a value to a property.
    pub fn with(mut self, property: &str, value: Value) -> Self {
        self.add(property, value);
        self
    }

    /// Builder: add a reference to another subject.
    pub fn with_ref(self, property: &str, id: impl AsRef<str>) -> Self {
        self.with(property, reference(id.as_ref()))
    }

    pub fn is_type(&self, kind: &str) -> bool {
        self.kind.as_deref() == Some(kind)
    }

    /// All values of a property, with arrays flattened.
    pub fn values(&self, property: &str) -> Vec<&Value> {
        match self.properties.get(property) {
            None => Vec::new(),
            Some(Value::Array(items)) => items.iter().collect(),
            Some(value) => vec![value],
        }
    }

    /// The `@id`s of all reference values of a property.
    pub fn refs(&self, property: &str) -> Vec<&str> {
        self.values(property)
            .into_iter()
            .filter_map(|v| v.get("@id").and_then(Value::as_str))
            .collect()
    }

    /// All string values of a property.
    pub fn strings(&self, property: &str) -> Vec<&str> {
        self.values(property)
            .into_iter()
            .filter_map(Value::as_str)
            .collect()
    }

    /// Whether the property contains the given value.
    pub fn has_value(&self, property: &str, value: &Value) -> bool {
        self.values(property).into_iter().any(|v| v == value)
    }

    /// Add a value to a property's set. Returns false if it was present.
    pub fn add(&mut self, property: &str, value: Value) -> bool {
        let mut values: Vec<Value> = self.values(property).into_iter().cloned().collect();
        if values.contains(&value) {
            return false;
        }
        values.push(value);
        self.set_values(property, values);
        true
    }

    /// Remove a value from a property's set. Returns false if it was absent.
    pub fn remove(&mut self, property: &str, value: &Value) -> bool {
        let before = self.values(property).len();
        let values: Vec<Value> = self
            .values(property)
            .into_iter()
            .filter(|v| *v != value)
            .cloned()
            .collect();
        let removed = values.len() != before;
        self.set_values(property, values);
        removed
    }

    /// Set union of another description of the same subject into this one.
    pub fn merge(&mut self, other: &Subject) {
        if other.kind.is_some() {
            self.kind.clone_from(&other.kind);
        }
        for property in other.properties.keys() {
            for value in other.values(property) {
                self.add(property, value.clone());
            }
        }
    }

    /// Remove every value mentioned by `other` from this subject.
    pub fn subtract(&mut self, other: &Subject) {
        if other.kind.is_some() && other.kind == self.kind {
            self.kind = None;
        }
        for property in other.properties.keys() {
            for value in other.values(property) {
                self.remove(property, value);
            }
        }
    }

    /// True if the subject carries no type and no properties.
    pub fn is_empty(&self) -> bool {
        self.kind.is_none() && self.properties.is_empty()
    }

    fn set_values(&mut self, property: &str, mut values: Vec<Value>) {
        match values.len() {
            0 => {
                self.properties.remove(property);
            }
            1 => {
                self.properties
                    .insert(property.to_string(), values.remove(0));
            }
            _ => {
                self.properties
                    .insert(property.to_string(), Value::Array(values));
            }
        }
    }
}

/// A reference value pointing at the subject with the given `@id`.
pub fn reference(id: &str) -> Value {
    json!({ "@id": id })
}

/// A set of subject descriptions to delete and insert atomically.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Update {
    #[serde(rename = "@delete", default, skip_serializing_if = "Vec::is_empty")]
    pub deletes: Vec<Subject>,
    #[serde(rename = "@insert", default, skip_serializing_if = "Vec::is_empty")]
    pub inserts: Vec<Subject>,
}

impl Update {
    pub fn inserting(subject: Subject) -> Self {
        Self {
            inserts: vec![subject],
            ..Default::default()
        }
    }

    pub fn deleting(subject: Subject) -> Self {
        Self {
            deletes: vec![subject],
            ..Default::default()
        }
    }

    pub fn insert(mut self, subject: Subject) -> Self {
        self.inserts.push(subject);
        self
    }

    pub fn delete(mut self, subject: Subject) -> Self {
        self.deletes.push(subject);
        self
    }

    /// Append another update's deletes and inserts.
    pub fn extend(&mut self, other: Update) {
        self.deletes.extend(other.deletes);
        self.inserts.extend(other.inserts);
    }

    pub fn is_empty(&self) -> bool {
        self.deletes.is_empty() && self.inserts.is_empty()
    }

    /// Every subject description in the update, deletes first.
    pub fn subjects(&self) -> impl Iterator<Item = &Subject> {
        self.deletes.iter().chain(self.inserts.iter())
    }
}
