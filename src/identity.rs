//! Object identity - the `(class, id)` key of every configuration object
//!
//! Textual form: `<id>@<Class>`
//!
//! Examples:
//! - `root-session@Session`
//! - `df-01@DFApplication`

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity of an object instance.
///
/// Two objects with the same pair are the same object regardless of how they
/// were reached. The derived ordering sorts by class name, then id, which is
/// the emission order of serialized databases.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId {
    /// Class name
    pub class: String,
    /// Unique id within the class
    pub id: String,
}

impl ObjectId {
    /// Create a new ObjectId
    pub fn new(class: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            id: id.into(),
        }
    }

    /// Parse `<id>@<Class>`
    ///
    /// The class is taken from the last `@`, so ids may themselves contain `@`.
    pub fn parse(s: &str) -> Result<Self> {
        let (id, class) = s
            .rsplit_once('@')
            .ok_or_else(|| Error::InvalidIdentity(format!("'{}' must be of the form id@Class", s)))?;

        if id.is_empty() {
            return Err(Error::InvalidIdentity(format!("'{}' has an empty id", s)));
        }
        if class.is_empty() {
            return Err(Error::InvalidIdentity(format!("'{}' has an empty class", s)));
        }

        Ok(Self::new(class, id))
    }

    /// Convert to `<id>@<Class>`
    pub fn to_key_string(&self) -> String {
        format!("{}@{}", self.id, self.class)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.class)
    }
}

impl FromStr for ObjectId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for ObjectId {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_key_string())
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ObjectId::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_string() {
        let id = ObjectId::new("Session", "root-session");
        assert_eq!(id.to_key_string(), "root-session@Session");
        assert_eq!(ObjectId::parse("root-session@Session").unwrap(), id);
    }

    #[test]
    fn test_id_may_contain_at() {
        let id = ObjectId::parse("user@host@Variable").unwrap();
        assert_eq!(id.id, "user@host");
        assert_eq!(id.class, "Variable");
    }

    #[test]
    fn test_invalid_identity() {
        assert!(ObjectId::parse("no-separator").is_err());
        assert!(ObjectId::parse("@Session").is_err());
        assert!(ObjectId::parse("id@").is_err());
    }

    #[test]
    fn test_ordering_is_class_then_id() {
        let mut ids = vec![
            ObjectId::new("Segment", "a"),
            ObjectId::new("Application", "z"),
            ObjectId::new("Application", "b"),
        ];
        ids.sort();
        assert_eq!(ids[0], ObjectId::new("Application", "b"));
        assert_eq!(ids[1], ObjectId::new("Application", "z"));
        assert_eq!(ids[2], ObjectId::new("Segment", "a"));
    }
}
