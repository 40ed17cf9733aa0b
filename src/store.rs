//! Object Store - in-memory home of every loaded object instance
//!
//! Objects are indexed by identity. Relationship values are identity lookups
//! back into this store, never owning pointers.

use std::collections::{BTreeMap, BTreeSet};
use crate::identity::ObjectId;
use crate::object::{Object, RelationshipValue, Value};
use crate::schema::{RelationshipSpec, SchemaCatalog};
use crate::{Error, Result};

/// Owner of all object instances of a database.
///
/// Iteration order is by identity, so it is stable for a given store state.
#[derive(Debug, Default)]
pub struct ObjectStore {
    /// All objects indexed by identity
    objects: BTreeMap<ObjectId, Object>,
    /// Canonical key of the data file that defined each object
    origins: BTreeMap<ObjectId, String>,
}

impl ObjectStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an object if its identity is absent.
    ///
    /// Re-inserting a present identity is a no-op; returns whether the object
    /// was inserted.
    pub fn add(&mut self, object: Object) -> bool {
        if self.objects.contains_key(&object.id) {
            return false;
        }
        self.objects.insert(object.id.clone(), object);
        true
    }

    /// Insert an object and record the file that defined it
    pub fn add_from(&mut self, object: Object, file: impl Into<String>) -> bool {
        let id = object.id.clone();
        let inserted = self.add(object);
        if inserted {
            self.origins.insert(id, file.into());
        }
        inserted
    }

    /// Create an empty object of a declared class
    pub fn create(&mut self, catalog: &SchemaCatalog, id: ObjectId) -> Result<&Object> {
        catalog.resolve_class(&id.class)?;
        if self.objects.contains_key(&id) {
            return Err(Error::DuplicateObject(id));
        }
        self.objects.insert(id.clone(), Object::from_id(id.clone()));
        self.require(&id)
    }

    /// Get an object by identity
    pub fn get(&self, id: &ObjectId) -> Option<&Object> {
        self.objects.get(id)
    }

    /// Get an object by identity, failing with `ObjectNotFound`
    pub fn require(&self, id: &ObjectId) -> Result<&Object> {
        self.objects
            .get(id)
            .ok_or_else(|| Error::ObjectNotFound(id.clone()))
    }

    pub(crate) fn require_mut(&mut self, id: &ObjectId) -> Result<&mut Object> {
        self.objects
            .get_mut(id)
            .ok_or_else(|| Error::ObjectNotFound(id.clone()))
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.objects.contains_key(id)
    }

    /// Delete an object.
    ///
    /// References to it elsewhere are left dangling.
    pub fn remove(&mut self, id: &ObjectId) -> Result<Object> {
        let object = self
            .objects
            .remove(id)
            .ok_or_else(|| Error::ObjectNotFound(id.clone()))?;
        self.origins.remove(id);
        Ok(object)
    }

    /// Delete an object and strip it from every multi-valued relationship
    /// that referenced it. Single-valued references are left as they are and
    /// reported back.
    pub fn destroy(&mut self, id: &ObjectId) -> Result<DestroyReport> {
        let removed = self.remove(id)?;
        let mut report = DestroyReport {
            removed: removed.id,
            detached: Vec::new(),
            dangling: Vec::new(),
        };

        for object in self.objects.values_mut() {
            for (name, value) in object.relationships.iter_mut() {
                match value {
                    RelationshipValue::Multi(targets) => {
                        let before = targets.len();
                        targets.retain(|t| t != id);
                        if targets.len() != before {
                            report.detached.push((object.id.clone(), name.clone()));
                        }
                    }
                    RelationshipValue::Single(Some(target)) if target == id => {
                        report.dangling.push((object.id.clone(), name.clone()));
                    }
                    RelationshipValue::Single(_) => {}
                }
            }
        }

        tracing::debug!(
            "destroyed {} (detached from {}, dangling in {})",
            report.removed,
            report.detached.len(),
            report.dangling.len()
        );
        Ok(report)
    }

    /// Every object, ordered by identity.
    ///
    /// Calling again restarts the sequence.
    pub fn all(&self) -> impl Iterator<Item = &Object> {
        self.objects.values()
    }

    /// Every identity, ordered
    pub fn ids(&self) -> impl Iterator<Item = &ObjectId> {
        self.objects.keys()
    }

    /// Objects of a class, optionally including instances of subclasses
    pub fn objects_of_class(
        &self,
        catalog: &SchemaCatalog,
        class: &str,
        include_subclasses: bool,
    ) -> Vec<&Object> {
        self.objects
            .values()
            .filter(|o| {
                if include_subclasses {
                    catalog.is_subclass_of(o.class(), class)
                } else {
                    o.class() == class
                }
            })
            .collect()
    }

    /// File that defined an object, if it was loaded from one
    pub fn origin(&self, id: &ObjectId) -> Option<&str> {
        self.origins.get(id).map(String::as_str)
    }

    /// Record (or move) the defining file of an object
    pub fn set_origin(&mut self, id: &ObjectId, file: impl Into<String>) -> Result<()> {
        self.require(id)?;
        self.origins.insert(id.clone(), file.into());
        Ok(())
    }

    /// Objects defined by any of the given files
    pub fn defined_in(&self, files: &BTreeSet<String>) -> Vec<&ObjectId> {
        self.origins
            .iter()
            .filter(|(_, file)| files.contains(*file))
            .map(|(id, _)| id)
            .collect()
    }

    /// Every `(object, relationship)` that references `target`
    pub fn referrers(&self, target: &ObjectId) -> Vec<(&ObjectId, &str)> {
        self.objects
            .values()
            .flat_map(|o| {
                o.references()
                    .filter(move |(_, t)| *t == target)
                    .map(move |(name, _)| (&o.id, name))
            })
            .collect()
    }

    /// Every effective relationship of an object with its spec and current
    /// targets, sorted by relationship name
    pub fn relationships_of<'a>(
        &'a self,
        catalog: &'a SchemaCatalog,
        id: &ObjectId,
    ) -> Result<Vec<RelationshipView<'a>>> {
        let object = self.require(id)?;
        let specs = catalog.effective_relationships(object.class())?;

        Ok(specs
            .iter()
            .map(|(name, spec)| RelationshipView {
                name,
                spec,
                targets: object
                    .relationship(name)
                    .map(RelationshipValue::targets)
                    .unwrap_or(&[]),
            })
            .collect())
    }

    /// Set an attribute after checking it against the effective schema
    pub fn set_attribute(
        &mut self,
        catalog: &SchemaCatalog,
        id: &ObjectId,
        name: &str,
        value: Value,
    ) -> Result<()> {
        let class = self.require(id)?.class().to_string();
        let kind = *catalog
            .effective_attributes(&class)?
            .get(name)
            .ok_or_else(|| Error::UnknownAttribute {
                class: class.clone(),
                attribute: name.to_string(),
            })?;

        if !value.conforms_to(kind) {
            return Err(Error::TypeMismatch {
                name: name.to_string(),
                expected: kind.to_string(),
                found: value.kind().to_string(),
            });
        }

        self.require_mut(id)?
            .attributes
            .insert(name.to_string(), value.coerced(kind));
        Ok(())
    }

    /// Get statistics about the store
    pub fn stats(&self) -> StoreStats {
        let classes: BTreeSet<&str> = self.objects.values().map(|o| o.class()).collect();
        let references = self.objects.values().map(|o| o.references().count()).sum();
        let files: BTreeSet<&String> = self.origins.values().collect();

        StoreStats {
            objects: self.objects.len(),
            classes: classes.len(),
            references,
            files: files.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// One relationship of an object, as shown to editing clients
#[derive(Debug, Clone)]
pub struct RelationshipView<'a> {
    pub name: &'a str,
    pub spec: &'a RelationshipSpec,
    pub targets: &'a [ObjectId],
}

/// Outcome of [`ObjectStore::destroy`]
#[derive(Debug, Clone)]
pub struct DestroyReport {
    pub removed: ObjectId,
    /// Multi-valued relationships the object was stripped from
    pub detached: Vec<(ObjectId, String)>,
    /// Single-valued relationships still pointing at the removed object
    pub dangling: Vec<(ObjectId, String)>,
}

/// Statistics about an object store
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub objects: usize,
    pub classes: usize,
    pub references: usize,
    pub files: usize,
}

impl std::fmt::Display for StoreStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Object Store Statistics:")?;
        writeln!(f, "  Data files: {}", self.files)?;
        writeln!(f, "  Classes in use: {}", self.classes)?;
        writeln!(f, "  Objects: {}", self.objects)?;
        writeln!(f, "  References: {}", self.references)
    }
}
