//! Relationship Mutator - validated in-place relationship edits
//!
//! Every edit is checked against the object's effective schema in a fixed
//! order: relationship exists, target types conform, cardinality fits,
//! targets exist and, when the mutator is scoped to an include graph, sit
//! in files the edited object's file can reach. A failed edit leaves the
//! store untouched. Not-null is only checked on an
//! explicit `validate`, since editing passes through transient empty states.

use crate::identity::ObjectId;
use crate::include::IncludeGraph;
use crate::object::{Object, RelationshipValue};
use crate::schema::{Multiplicity, RelationshipSpec, SchemaCatalog};
use crate::store::ObjectStore;
use crate::{Error, Result};

/// A not-null relationship that currently references nothing
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct NotNullViolation {
    pub object: ObjectId,
    pub relationship: String,
}

impl std::fmt::Display for NotNullViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{} is empty", self.object, self.relationship)
    }
}

pub(crate) fn describe_violations(violations: &[NotNullViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Editing front-end over a live store
pub struct RelationshipMutator<'a> {
    catalog: &'a SchemaCatalog,
    store: &'a mut ObjectStore,
    includes: Option<&'a IncludeGraph>,
}

impl<'a> RelationshipMutator<'a> {
    pub fn new(catalog: &'a SchemaCatalog, store: &'a mut ObjectStore) -> Self {
        Self {
            catalog,
            store,
            includes: None,
        }
    }

    /// Reject references to objects defined outside the include closure of
    /// the edited object's file
    pub fn with_scope(mut self, includes: &'a IncludeGraph) -> Self {
        self.includes = Some(includes);
        self
    }

    /// Replace the whole value of a relationship
    pub fn set_relationship(&mut self, object: &ObjectId, name: &str, values: &[ObjectId]) -> Result<()> {
        let spec = self.spec_for(object, name)?;
        check_targets(self.catalog, name, &spec, values)?;
        if spec.multiplicity == Multiplicity::Single && values.len() > 1 {
            return Err(Error::CardinalityViolation {
                relationship: name.to_string(),
                count: values.len(),
            });
        }
        self.check_present(values)?;
        self.check_scope(object, values)?;

        let value = match spec.multiplicity {
            Multiplicity::Single => RelationshipValue::Single(values.first().cloned()),
            Multiplicity::Multi => RelationshipValue::Multi(values.to_vec()),
        };
        self.store
            .require_mut(object)?
            .relationships
            .insert(name.to_string(), value);

        tracing::debug!("set {}.{} ({} values)", object, name, values.len());
        Ok(())
    }

    /// Add one reference to a multi-valued relationship
    pub fn append_relationship(&mut self, object: &ObjectId, name: &str, value: &ObjectId) -> Result<()> {
        let spec = self.spec_for(object, name)?;
        let values = std::slice::from_ref(value);
        check_targets(self.catalog, name, &spec, values)?;
        if spec.multiplicity == Multiplicity::Single {
            return Err(Error::CardinalityViolation {
                relationship: name.to_string(),
                count: 1 + self.current_targets(object, name)?.len(),
            });
        }
        self.check_present(values)?;
        self.check_scope(object, values)?;

        let entry = self
            .store
            .require_mut(object)?
            .relationships
            .entry(name.to_string())
            .or_insert_with(|| RelationshipValue::Multi(Vec::new()));
        let mut targets = entry.targets().to_vec();
        targets.push(value.clone());
        *entry = RelationshipValue::Multi(targets);
        Ok(())
    }

    /// Remove one reference, by identity.
    ///
    /// Multi-valued: drops the first matching reference. Single-valued:
    /// clears the value if it is `value`. Removing a reference that is not
    /// held fails with `ReferenceNotPresent`.
    pub fn remove_relationship(&mut self, object: &ObjectId, name: &str, value: &ObjectId) -> Result<()> {
        self.spec_for(object, name)?;

        let not_present = || Error::ReferenceNotPresent {
            object: object.clone(),
            relationship: name.to_string(),
            target: value.clone(),
        };

        let current = self
            .store
            .require_mut(object)?
            .relationships
            .get_mut(name)
            .ok_or_else(not_present)?;

        match current {
            RelationshipValue::Multi(targets) => {
                let index = targets.iter().position(|t| t == value).ok_or_else(not_present)?;
                targets.remove(index);
            }
            RelationshipValue::Single(target) => {
                if target.as_ref() != Some(value) {
                    return Err(not_present());
                }
                *target = None;
            }
        }

        tracing::debug!("removed {} from {}.{}", value, object, name);
        Ok(())
    }

    /// Report every not-null relationship of the object that is empty
    pub fn validate(&self, object: &ObjectId) -> Result<()> {
        let violations = not_null_violations(self.catalog, self.store.require(object)?)?;
        if violations.is_empty() {
            Ok(())
        } else {
            Err(Error::NotNullViolations(violations))
        }
    }

    /// Batch not-null validation over the whole store, in identity order
    pub fn validate_all(&self) -> Result<()> {
        let mut violations = Vec::new();
        for object in self.store.all() {
            violations.extend(not_null_violations(self.catalog, object)?);
        }
        if violations.is_empty() {
            Ok(())
        } else {
            Err(Error::NotNullViolations(violations))
        }
    }

    /// Disable (`enabled == false`) or re-enable a resource by adding it to or
    /// removing it from a multi-valued relationship of `holder`.
    ///
    /// Returns whether anything changed; asking for the current state is not
    /// an error.
    pub fn set_enabled(
        &mut self,
        holder: &ObjectId,
        relationship: &str,
        resource: &ObjectId,
        enabled: bool,
    ) -> Result<bool> {
        let disabled = self.current_targets(holder, relationship)?.contains(resource);
        match (enabled, disabled) {
            (false, false) => {
                self.append_relationship(holder, relationship, resource)?;
                tracing::info!("disabled {} in {}", resource, holder);
                Ok(true)
            }
            (true, true) => {
                self.remove_relationship(holder, relationship, resource)?;
                tracing::info!("enabled {} in {}", resource, holder);
                Ok(true)
            }
            _ => {
                tracing::debug!(
                    "{} already {} in {}",
                    resource,
                    if enabled { "enabled" } else { "disabled" },
                    holder
                );
                Ok(false)
            }
        }
    }

    fn spec_for(&self, object: &ObjectId, name: &str) -> Result<RelationshipSpec> {
        let class = &self.store.require(object)?.id.class;
        Ok(self.catalog.relationship(class, name)?.clone())
    }

    fn current_targets(&self, object: &ObjectId, name: &str) -> Result<Vec<ObjectId>> {
        self.spec_for(object, name)?;
        Ok(self
            .store
            .require(object)?
            .relationship(name)
            .map(|v| v.targets().to_vec())
            .unwrap_or_default())
    }

    fn check_present(&self, values: &[ObjectId]) -> Result<()> {
        for value in values {
            self.store.require(value)?;
        }
        Ok(())
    }

    fn check_scope(&self, object: &ObjectId, values: &[ObjectId]) -> Result<()> {
        let Some(includes) = self.includes else {
            return Ok(());
        };
        let Some(file) = self.store.origin(object) else {
            return Ok(());
        };

        let mut scope = None;
        for value in values {
            let Some(target_file) = self.store.origin(value) else {
                continue;
            };
            if scope.is_none() {
                scope = Some(includes.closure(file)?);
            }
            if !scope.as_ref().is_some_and(|s| s.contains(target_file)) {
                return Err(Error::OutOfScope {
                    from: object.clone(),
                    target: value.clone(),
                    file: file.to_string(),
                });
            }
        }
        Ok(())
    }
}

fn check_targets(catalog: &SchemaCatalog, name: &str, spec: &RelationshipSpec, values: &[ObjectId]) -> Result<()> {
    for value in values {
        if !catalog.is_subclass_of(&value.class, &spec.class) {
            return Err(Error::TypeMismatch {
                name: name.to_string(),
                expected: spec.class.clone(),
                found: value.class.clone(),
            });
        }
    }
    Ok(())
}

fn not_null_violations(catalog: &SchemaCatalog, object: &Object) -> Result<Vec<NotNullViolation>> {
    Ok(catalog
        .effective_relationships(object.class())?
        .iter()
        .filter(|(_, spec)| spec.not_null)
        .filter(|(name, _)| object.relationship(name).map(RelationshipValue::is_empty).unwrap_or(true))
        .map(|(name, _)| NotNullViolation {
            object: object.id.clone(),
            relationship: name.clone(),
        })
        .collect())
}

/// Check a freshly loaded object against the schema: known class, known and
/// well-typed attributes, known relationships of the right shape and target
/// classes. Attribute values are coerced to their declared kind.
pub(crate) fn check_object(catalog: &SchemaCatalog, object: &mut Object) -> Result<()> {
    let class = object.id.class.clone();
    let attributes = catalog.effective_attributes(&class)?;

    for (name, value) in object.attributes.iter_mut() {
        let kind = *attributes.get(name).ok_or_else(|| Error::UnknownAttribute {
            class: class.clone(),
            attribute: name.clone(),
        })?;
        if !value.conforms_to(kind) {
            return Err(Error::TypeMismatch {
                name: name.clone(),
                expected: kind.to_string(),
                found: value.kind().to_string(),
            });
        }
        *value = value.clone().coerced(kind);
    }

    for (name, value) in object.relationships.iter_mut() {
        let spec = catalog.relationship(&class, name)?;
        check_targets(catalog, name, spec, value.targets())?;
        let targets = value.targets().to_vec();
        match spec.multiplicity {
            Multiplicity::Single if targets.len() > 1 => {
                return Err(Error::CardinalityViolation {
                    relationship: name.clone(),
                    count: targets.len(),
                });
            }
            Multiplicity::Single => *value = RelationshipValue::Single(targets.into_iter().next()),
            Multiplicity::Multi => *value = RelationshipValue::Multi(targets),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Value;
    use crate::schema::{AttributeKind, ClassDef};

    fn catalog() -> SchemaCatalog {
        SchemaCatalog::from_classes([
            ClassDef::new("Resource"),
            ClassDef::new("Application").with_superclass("Resource"),
            ClassDef::new("DFApplication").with_superclass("Application"),
            ClassDef::new("Host").with_attribute("cores", AttributeKind::Integer),
            ClassDef::new("Segment")
                .with_superclass("Resource")
                .with_relationship("controller", RelationshipSpec::single("Application").not_null())
                .with_relationship("applications", RelationshipSpec::multi("Application")),
            ClassDef::new("Session")
                .with_relationship("segment", RelationshipSpec::single("Segment").not_null())
                .with_relationship("disabled", RelationshipSpec::multi("Resource")),
        ])
        .unwrap()
    }

    fn id(class: &str, name: &str) -> ObjectId {
        ObjectId::new(class, name)
    }

    fn store() -> ObjectStore {
        let mut store = ObjectStore::new();
        store.add(Object::new("Segment", "seg").with_multi("applications", vec![id("Application", "app1")]));
        store.add(Object::new("Application", "app1"));
        store.add(Object::new("Application", "app2"));
        store.add(Object::new("DFApplication", "df"));
        store.add(Object::new("Host", "host"));
        store.add(Object::new("Session", "s"));
        store
    }

    #[test]
    fn test_single_rejects_two_values() {
        let catalog = catalog();
        let mut store = store();
        let mut mutator = RelationshipMutator::new(&catalog, &mut store);

        let err = mutator
            .set_relationship(&id("Segment", "seg"), "controller", &[id("Application", "app1"), id("Application", "app2")])
            .unwrap_err();
        assert!(matches!(err, Error::CardinalityViolation { count: 2, .. }));
    }

    #[test]
    fn test_type_mismatch() {
        let catalog = catalog();
        let mut store = store();
        let mut mutator = RelationshipMutator::new(&catalog, &mut store);

        let err = mutator
            .set_relationship(&id("Segment", "seg"), "controller", &[id("Host", "host")])
            .unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { ref expected, ref found, .. }
            if expected == "Application" && found == "Host"));
    }

    #[test]
    fn test_subclass_is_accepted() {
        let catalog = catalog();
        let mut store = store();
        let mut mutator = RelationshipMutator::new(&catalog, &mut store);

        mutator
            .set_relationship(&id("Segment", "seg"), "controller", &[id("DFApplication", "df")])
            .unwrap();
        let seg = store.get(&id("Segment", "seg")).unwrap();
        assert!(seg.relationship("controller").unwrap().references(&id("DFApplication", "df")));
    }

    #[test]
    fn test_unknown_relationship() {
        let catalog = catalog();
        let mut store = store();
        let mut mutator = RelationshipMutator::new(&catalog, &mut store);

        let err = mutator
            .set_relationship(&id("Segment", "seg"), "owner", &[])
            .unwrap_err();
        assert!(matches!(err, Error::UnknownRelationship { .. }));
    }

    #[test]
    fn test_failed_edit_leaves_store_unchanged() {
        let catalog = catalog();
        let mut store = store();
        let before = store.get(&id("Segment", "seg")).cloned();
        let mut mutator = RelationshipMutator::new(&catalog, &mut store);

        assert!(mutator
            .set_relationship(&id("Segment", "seg"), "applications", &[id("Application", "app2"), id("Host", "host")])
            .is_err());
        assert!(mutator
            .set_relationship(&id("Segment", "seg"), "applications", &[id("Application", "ghost")])
            .is_err());
        assert_eq!(store.get(&id("Segment", "seg")).cloned(), before);
    }

    #[test]
    fn test_remove_twice_fails() {
        let catalog = catalog();
        let mut store = store();
        let mut mutator = RelationshipMutator::new(&catalog, &mut store);
        let seg = id("Segment", "seg");
        let app1 = id("Application", "app1");

        mutator.remove_relationship(&seg, "applications", &app1).unwrap();
        let err = mutator.remove_relationship(&seg, "applications", &app1).unwrap_err();
        assert!(matches!(err, Error::ReferenceNotPresent { .. }));

        let applications = store.get(&seg).unwrap().relationship("applications").unwrap();
        assert!(!applications.references(&app1));
    }

    #[test]
    fn test_remove_clears_single() {
        let catalog = catalog();
        let mut store = store();
        let mut mutator = RelationshipMutator::new(&catalog, &mut store);
        let seg = id("Segment", "seg");
        let app1 = id("Application", "app1");

        mutator.set_relationship(&seg, "controller", &[app1.clone()]).unwrap();
        assert!(mutator.remove_relationship(&seg, "controller", &id("Application", "app2")).is_err());
        mutator.remove_relationship(&seg, "controller", &app1).unwrap();
        assert!(mutator.remove_relationship(&seg, "controller", &app1).is_err());
    }

    #[test]
    fn test_append_only_for_multi() {
        let catalog = catalog();
        let mut store = store();
        let mut mutator = RelationshipMutator::new(&catalog, &mut store);
        let seg = id("Segment", "seg");

        mutator.append_relationship(&seg, "applications", &id("Application", "app2")).unwrap();
        let err = mutator
            .append_relationship(&seg, "controller", &id("Application", "app2"))
            .unwrap_err();
        assert!(matches!(err, Error::CardinalityViolation { .. }));

        let apps = store.get(&seg).unwrap().relationship("applications").unwrap();
        assert_eq!(apps.targets().len(), 2);
    }

    #[test]
    fn test_not_null_is_deferred_and_batched() {
        let catalog = catalog();
        let mut store = store();
        let mut mutator = RelationshipMutator::new(&catalog, &mut store);
        let seg = id("Segment", "seg");

        // Transient empty state is allowed while editing
        mutator.set_relationship(&seg, "controller", &[]).unwrap();

        let err = mutator.validate(&seg).unwrap_err();
        match err {
            Error::NotNullViolations(v) => {
                assert_eq!(v.len(), 1);
                assert_eq!(v[0].relationship, "controller");
            }
            other => panic!("unexpected error: {other}"),
        }

        match mutator.validate_all().unwrap_err() {
            Error::NotNullViolations(v) => assert_eq!(v.len(), 2),
            other => panic!("unexpected error: {other}"),
        }

        mutator.set_relationship(&seg, "controller", &[id("Application", "app1")]).unwrap();
        mutator.validate(&seg).unwrap();
    }

    #[test]
    fn test_set_enabled_toggles_disabled_list() {
        let catalog = catalog();
        let mut store = store();
        let mut mutator = RelationshipMutator::new(&catalog, &mut store);
        let session = id("Session", "s");
        let app = id("Application", "app1");

        assert!(mutator.set_enabled(&session, "disabled", &app, false).unwrap());
        assert!(!mutator.set_enabled(&session, "disabled", &app, false).unwrap());
        assert!(mutator.set_enabled(&session, "disabled", &app, true).unwrap());
        assert!(!mutator.set_enabled(&session, "disabled", &app, true).unwrap());
    }

    #[test]
    fn test_check_object_normalizes_shapes() {
        let catalog = catalog();
        let mut seg = Object::new("Segment", "seg")
            .with_multi("controller", vec![id("Application", "app1")])
            .with_single("applications", Some(id("Application", "app2")));
        check_object(&catalog, &mut seg).unwrap();
        assert!(matches!(seg.relationship("controller"), Some(RelationshipValue::Single(Some(_)))));
        assert!(matches!(seg.relationship("applications"), Some(RelationshipValue::Multi(v)) if v.len() == 1));

        let mut host = Object::new("Host", "h").with_attribute("cores", Value::String("many".into()));
        assert!(matches!(check_object(&catalog, &mut host), Err(Error::TypeMismatch { .. })));
    }
}
