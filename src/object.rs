//! Object instances - attribute values and relationship references
//!
//! Attribute values are scalars of one of four kinds:
//! - `Integer`: signed 64-bit
//! - `Float`: 64-bit floating point
//! - `String`: UTF-8 text
//! - `Boolean`: true/false
//!
//! Relationship values never own their targets. They hold identities that are
//! resolved against the owning store on demand, so the object graph may be
//! cyclic without any ownership bookkeeping.

use crate::identity::ObjectId;
use crate::schema::AttributeKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A scalar attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl Value {
    /// The kind this value was written as
    pub fn kind(&self) -> AttributeKind {
        match self {
            Value::Boolean(_) => AttributeKind::Boolean,
            Value::Integer(_) => AttributeKind::Integer,
            Value::Float(_) => AttributeKind::Float,
            Value::String(_) => AttributeKind::String,
        }
    }

    /// Check whether the value may be stored in an attribute of `kind`.
    ///
    /// Integers widen to floats; nothing else converts.
    pub fn conforms_to(&self, kind: AttributeKind) -> bool {
        self.kind() == kind || matches!((self, kind), (Value::Integer(_), AttributeKind::Float))
    }

    /// Coerce into the storage representation for `kind`
    pub fn coerced(self, kind: AttributeKind) -> Value {
        match (self, kind) {
            (Value::Integer(i), AttributeKind::Float) => Value::Float(i as f64),
            (v, _) => v,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "{:?}", s),
        }
    }
}

/// The current value of one relationship of an object.
///
/// Serialized as `null`, `"id@Class"` or `["id@Class", ...]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelationshipValue {
    Multi(Vec<ObjectId>),
    Single(Option<ObjectId>),
}

impl RelationshipValue {
    /// All referenced identities, in stored order
    pub fn targets(&self) -> &[ObjectId] {
        match self {
            RelationshipValue::Multi(ids) => ids,
            RelationshipValue::Single(id) => id.as_slice(),
        }
    }

    /// True when the relationship references nothing
    pub fn is_empty(&self) -> bool {
        self.targets().is_empty()
    }

    /// Check whether `target` is referenced
    pub fn references(&self, target: &ObjectId) -> bool {
        self.targets().contains(target)
    }
}

/// An object instance.
///
/// Objects are owned by the store that loaded or created them.
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    /// Identity key
    pub id: ObjectId,
    /// Attribute name → scalar value
    pub attributes: BTreeMap<String, Value>,
    /// Relationship name → current references
    pub relationships: BTreeMap<String, RelationshipValue>,
}

impl Object {
    /// Create an object with no attribute or relationship values
    pub fn new(class: impl Into<String>, id: impl Into<String>) -> Self {
        Self::from_id(ObjectId::new(class, id))
    }

    /// Create an empty object for an existing identity
    pub fn from_id(id: ObjectId) -> Self {
        Self {
            id,
            attributes: BTreeMap::new(),
            relationships: BTreeMap::new(),
        }
    }

    /// Set an attribute value
    pub fn with_attribute(mut self, name: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    /// Set a single-valued relationship
    pub fn with_single(mut self, name: impl Into<String>, target: Option<ObjectId>) -> Self {
        self.relationships
            .insert(name.into(), RelationshipValue::Single(target));
        self
    }

    /// Set a multi-valued relationship
    pub fn with_multi(mut self, name: impl Into<String>, targets: Vec<ObjectId>) -> Self {
        self.relationships
            .insert(name.into(), RelationshipValue::Multi(targets));
        self
    }

    /// Class name of this object
    pub fn class(&self) -> &str {
        &self.id.class
    }

    /// Current value of a relationship, if one was ever set
    pub fn relationship(&self, name: &str) -> Option<&RelationshipValue> {
        self.relationships.get(name)
    }

    /// Every `(relationship, target)` pair held by this object
    pub fn references(&self) -> impl Iterator<Item = (&str, &ObjectId)> {
        self.relationships
            .iter()
            .flat_map(|(name, value)| value.targets().iter().map(move |t| (name.as_str(), t)))
    }
}
