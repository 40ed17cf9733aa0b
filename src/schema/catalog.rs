//! Schema catalog - static per-class metadata, flattened over inheritance

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::str::FromStr;

/// Scalar kind of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeKind {
    Integer,
    Float,
    String,
    Boolean,
}

impl AttributeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeKind::Integer => "integer",
            AttributeKind::Float => "float",
            AttributeKind::String => "string",
            AttributeKind::Boolean => "boolean",
        }
    }
}

impl FromStr for AttributeKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "integer" | "int" | "s64" | "u32" | "u64" | "s32" => Ok(AttributeKind::Integer),
            "float" | "double" => Ok(AttributeKind::Float),
            "string" | "str" => Ok(AttributeKind::String),
            "boolean" | "bool" => Ok(AttributeKind::Boolean),
            _ => Err(Error::Format(format!("Unknown attribute kind: {}", s))),
        }
    }
}

impl std::fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How many references a relationship may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Multiplicity {
    /// At most one reference
    Single,
    /// Any number of references, including zero
    Multi,
}

/// Declaration of one relationship of a class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipSpec {
    /// Target class; referenced objects must be of this class or a subclass
    pub class: String,
    pub multiplicity: Multiplicity,
    /// Once committed, the relationship must reference at least one object
    #[serde(default)]
    pub not_null: bool,
}

impl RelationshipSpec {
    pub fn single(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            multiplicity: Multiplicity::Single,
            not_null: false,
        }
    }

    pub fn multi(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            multiplicity: Multiplicity::Multi,
            not_null: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn is_multi(&self) -> bool {
        self.multiplicity == Multiplicity::Multi
    }
}

/// A class as declared by a schema file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDef {
    pub name: String,
    #[serde(default)]
    pub superclasses: Vec<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeKind>,
    #[serde(default)]
    pub relationships: BTreeMap<String, RelationshipSpec>,
    /// Canonical key of the schema file that declared the class
    #[serde(skip)]
    pub file: Option<String>,
}

impl ClassDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            superclasses: Vec::new(),
            attributes: BTreeMap::new(),
            relationships: BTreeMap::new(),
            file: None,
        }
    }

    pub fn with_superclass(mut self, parent: impl Into<String>) -> Self {
        self.superclasses.push(parent.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, kind: AttributeKind) -> Self {
        self.attributes.insert(name.into(), kind);
        self
    }

    pub fn with_relationship(mut self, name: impl Into<String>, spec: RelationshipSpec) -> Self {
        self.relationships.insert(name.into(), spec);
        self
    }

    pub fn in_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }
}

/// Flattened view of a class, computed once when the catalog is built.
#[derive(Debug, Clone, Default)]
struct Effective {
    /// The class followed by every ancestor, most-derived first
    lineage: Vec<String>,
    attributes: BTreeMap<String, AttributeKind>,
    relationships: BTreeMap<String, RelationshipSpec>,
}

/// Read-only catalog of every class declared by the loaded schema files.
#[derive(Debug, Default)]
pub struct SchemaCatalog {
    classes: BTreeMap<String, ClassDef>,
    effective: HashMap<String, Effective>,
}

impl SchemaCatalog {
    /// Build a catalog, checking that every superclass and relationship
    /// target is declared and that inheritance is acyclic.
    pub fn from_classes(defs: impl IntoIterator<Item = ClassDef>) -> Result<Self> {
        let mut classes: BTreeMap<String, ClassDef> = BTreeMap::new();
        for def in defs {
            if let Some(existing) = classes.get(&def.name) {
                return Err(Error::Format(format!(
                    "class {} declared twice ({} and {})",
                    def.name,
                    existing.file.as_deref().unwrap_or("<memory>"),
                    def.file.as_deref().unwrap_or("<memory>"),
                )));
            }
            classes.insert(def.name.clone(), def);
        }

        for def in classes.values() {
            for parent in &def.superclasses {
                if !classes.contains_key(parent) {
                    return Err(Error::ClassNotFound(parent.clone()));
                }
            }
            for spec in def.relationships.values() {
                if !classes.contains_key(&spec.class) {
                    return Err(Error::ClassNotFound(spec.class.clone()));
                }
            }
        }

        Self::check_acyclic(&classes)?;

        let effective = classes
            .keys()
            .map(|name| (name.clone(), Self::flatten(&classes, name)))
            .collect();

        Ok(Self { classes, effective })
    }

    /// Kahn's algorithm over superclass edges; anything left unprocessed
    /// sits on a cycle.
    fn check_acyclic(classes: &BTreeMap<String, ClassDef>) -> Result<()> {
        let mut pending: HashMap<&str, usize> = classes
            .values()
            .map(|def| (def.name.as_str(), def.superclasses.len()))
            .collect();
        let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
        for def in classes.values() {
            for parent in &def.superclasses {
                children.entry(parent.as_str()).or_default().push(def.name.as_str());
            }
        }

        let mut queue: VecDeque<&str> = pending
            .iter()
            .filter(|(_, n)| **n == 0)
            .map(|(name, _)| *name)
            .collect();
        let mut processed = 0usize;

        while let Some(name) = queue.pop_front() {
            processed += 1;
            for &child in children.get(name).map(|v| v.as_slice()).unwrap_or(&[]) {
                if let Some(n) = pending.get_mut(child) {
                    *n -= 1;
                    if *n == 0 {
                        queue.push_back(child);
                    }
                }
            }
        }

        if processed == classes.len() {
            return Ok(());
        }

        let stuck = pending
            .iter()
            .filter(|(_, n)| **n > 0)
            .map(|(name, _)| *name)
            .min()
            .unwrap_or_default();
        Err(Error::InheritanceCycle(stuck.to_string()))
    }

    /// Lineage in reverse post-order, so every class precedes all of its
    /// ancestors and earlier superclasses precede later ones. Merging it
    /// base-first lets the most-derived definition of a name win.
    fn flatten(classes: &BTreeMap<String, ClassDef>, name: &str) -> Effective {
        let mut finished = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![(name.to_string(), false)];

        while let Some((current, expanded)) = stack.pop() {
            if expanded {
                finished.push(current);
                continue;
            }
            if !seen.insert(current.clone()) {
                continue;
            }
            stack.push((current.clone(), true));
            if let Some(def) = classes.get(&current) {
                stack.extend(def.superclasses.iter().map(|parent| (parent.clone(), false)));
            }
        }
        let lineage: Vec<String> = finished.into_iter().rev().collect();

        let mut attributes = BTreeMap::new();
        let mut relationships = BTreeMap::new();
        for class in lineage.iter().rev() {
            if let Some(def) = classes.get(class) {
                attributes.extend(def.attributes.iter().map(|(k, v)| (k.clone(), *v)));
                relationships.extend(def.relationships.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }

        Effective {
            lineage,
            attributes,
            relationships,
        }
    }

    /// Look up a class, failing with `ClassNotFound`
    pub fn resolve_class(&self, name: &str) -> Result<&ClassDef> {
        self.classes
            .get(name)
            .ok_or_else(|| Error::ClassNotFound(name.to_string()))
    }

    /// Look up a class without failing
    pub fn get(&self, name: &str) -> Option<&ClassDef> {
        self.classes.get(name)
    }

    fn effective(&self, name: &str) -> Result<&Effective> {
        self.effective
            .get(name)
            .ok_or_else(|| Error::ClassNotFound(name.to_string()))
    }

    /// Own and inherited relationships of a class, most-derived wins
    pub fn effective_relationships(&self, name: &str) -> Result<&BTreeMap<String, RelationshipSpec>> {
        Ok(&self.effective(name)?.relationships)
    }

    /// Own and inherited attributes of a class, most-derived wins
    pub fn effective_attributes(&self, name: &str) -> Result<&BTreeMap<String, AttributeKind>> {
        Ok(&self.effective(name)?.attributes)
    }

    /// Look up one effective relationship, failing with `UnknownRelationship`
    pub fn relationship(&self, class: &str, relationship: &str) -> Result<&RelationshipSpec> {
        self.effective_relationships(class)?
            .get(relationship)
            .ok_or_else(|| Error::UnknownRelationship {
                class: class.to_string(),
                relationship: relationship.to_string(),
            })
    }

    /// The class and all its ancestors, most-derived first
    pub fn lineage(&self, name: &str) -> Result<&[String]> {
        Ok(&self.effective(name)?.lineage)
    }

    /// True if `class` equals `ancestor` or inherits from it.
    /// Unknown classes are subclasses of nothing.
    pub fn is_subclass_of(&self, class: &str, ancestor: &str) -> bool {
        self.effective
            .get(class)
            .map(|e| e.lineage.iter().any(|c| c == ancestor))
            .unwrap_or(false)
    }

    /// Every class that is `name` or inherits from it, sorted
    pub fn subclasses_of(&self, name: &str) -> Vec<&str> {
        self.classes
            .keys()
            .filter(|c| self.is_subclass_of(c, name))
            .map(String::as_str)
            .collect()
    }

    /// Schema file that declared a class
    pub fn defining_file(&self, name: &str) -> Option<&str> {
        self.classes.get(name).and_then(|def| def.file.as_deref())
    }

    /// The given classes plus every class a file declaring them needs in
    /// scope: ancestors and relationship target classes, transitively.
    pub fn dependencies<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Result<BTreeSet<String>> {
        let mut out = BTreeSet::new();
        let mut queue: VecDeque<String> = names.into_iter().map(str::to_string).collect();

        while let Some(name) = queue.pop_front() {
            if out.contains(&name) {
                continue;
            }
            let effective = self.effective(&name)?;
            queue.extend(effective.lineage.iter().filter(|c| !out.contains(*c)).cloned());
            queue.extend(
                effective
                    .relationships
                    .values()
                    .filter(|spec| !out.contains(&spec.class))
                    .map(|spec| spec.class.clone()),
            );
            out.insert(name);
        }
        Ok(out)
    }

    /// All declared classes, sorted by name
    pub fn classes(&self) -> impl Iterator<Item = &ClassDef> {
        self.classes.values()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}
