//! Relationship closure - every object transitively reachable from roots
//!
//! Traversal is breadth-first over an explicit queue with a visited set keyed
//! by identity. Each identity is enqueued at most once, so arbitrary
//! reference cycles terminate and an object reached along several paths is
//! recorded once.

use std::collections::{BTreeSet, HashSet, VecDeque};
use crate::identity::ObjectId;
use crate::schema::SchemaCatalog;
use crate::store::ObjectStore;
use crate::{Error, Result};

/// The set of objects closed under relationship-following.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectClosure {
    members: BTreeSet<ObjectId>,
}

impl ObjectClosure {
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.members.contains(id)
    }

    /// Members in `(class, id)` order
    pub fn iter(&self) -> impl Iterator<Item = &ObjectId> {
        self.members.iter()
    }

    /// Distinct classes of the members
    pub fn classes(&self) -> BTreeSet<&str> {
        self.members.iter().map(|id| id.class.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn into_ids(self) -> BTreeSet<ObjectId> {
        self.members
    }
}

impl<'a> IntoIterator for &'a ObjectClosure {
    type Item = &'a ObjectId;
    type IntoIter = std::collections::btree_set::Iter<'a, ObjectId>;

    fn into_iter(self) -> Self::IntoIter {
        self.members.iter()
    }
}

/// Computes relationship closures over one store.
pub struct RelationshipClosure<'a> {
    catalog: &'a SchemaCatalog,
    store: &'a ObjectStore,
}

impl<'a> RelationshipClosure<'a> {
    pub fn new(catalog: &'a SchemaCatalog, store: &'a ObjectStore) -> Self {
        Self { catalog, store }
    }

    /// Smallest set containing `roots` and every object referenced, directly
    /// or transitively, by a member.
    ///
    /// A root absent from the store fails with `ObjectNotFound`; a reference
    /// to an absent identity fails with `DanglingReference`. A stored
    /// relationship the class does not declare fails with
    /// `UnknownRelationship` rather than being skipped.
    pub fn closure<'r>(&self, roots: impl IntoIterator<Item = &'r ObjectId>) -> Result<ObjectClosure> {
        let mut visited: HashSet<&ObjectId> = HashSet::new();
        let mut queue: VecDeque<&ObjectId> = VecDeque::new();

        for root in roots {
            let object = self.store.require(root)?;
            if visited.insert(&object.id) {
                queue.push_back(&object.id);
            }
        }

        while let Some(current) = queue.pop_front() {
            let object = self.store.require(current)?;
            let specs = self.catalog.effective_relationships(object.class())?;

            for (name, value) in &object.relationships {
                if !specs.contains_key(name) {
                    return Err(Error::UnknownRelationship {
                        class: object.class().to_string(),
                        relationship: name.clone(),
                    });
                }

                for target in value.targets() {
                    let Some(next) = self.store.get(target) else {
                        return Err(Error::DanglingReference {
                            from: current.clone(),
                            relationship: name.clone(),
                            target: target.clone(),
                        });
                    };
                    if visited.insert(&next.id) {
                        queue.push_back(&next.id);
                    }
                }
            }
        }

        tracing::debug!("relationship closure reached {} objects", visited.len());

        Ok(ObjectClosure {
            members: visited.into_iter().cloned().collect(),
        })
    }

    /// Check that every reference held by a member stays inside the set.
    pub fn is_closed(&self, set: &ObjectClosure) -> bool {
        set.iter().all(|id| {
            self.store
                .get(id)
                .map(|o| o.references().all(|(_, t)| set.contains(t)))
                .unwrap_or(false)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Object;
    use crate::schema::{ClassDef, RelationshipSpec};

    fn catalog() -> SchemaCatalog {
        SchemaCatalog::from_classes([
            ClassDef::new("Application")
                .with_relationship("peer", RelationshipSpec::single("Application")),
            ClassDef::new("Segment")
                .with_relationship("controller", RelationshipSpec::single("Application"))
                .with_relationship("applications", RelationshipSpec::multi("Application"))
                .with_relationship("segments", RelationshipSpec::multi("Segment")),
            ClassDef::new("Session")
                .with_relationship("segment", RelationshipSpec::single("Segment").not_null()),
        ])
        .unwrap()
    }

    fn id(class: &str, name: &str) -> ObjectId {
        ObjectId::new(class, name)
    }

    #[test]
    fn test_closure_follows_single_and_multi() {
        let catalog = catalog();
        let mut store = ObjectStore::new();
        store.add(Object::new("Session", "s").with_single("segment", Some(id("Segment", "seg"))));
        store.add(
            Object::new("Segment", "seg")
                .with_single("controller", Some(id("Application", "ctrl")))
                .with_multi("applications", vec![id("Application", "a1"), id("Application", "a2")]),
        );
        store.add(Object::new("Application", "ctrl"));
        store.add(Object::new("Application", "a1"));
        store.add(Object::new("Application", "a2"));
        store.add(Object::new("Application", "unrelated"));

        let closure = RelationshipClosure::new(&catalog, &store)
            .closure([&id("Session", "s")])
            .unwrap();

        assert_eq!(closure.len(), 5);
        assert!(!closure.contains(&id("Application", "unrelated")));
        assert!(RelationshipClosure::new(&catalog, &store).is_closed(&closure));
    }

    #[test]
    fn test_cycles_terminate() {
        let catalog = catalog();
        let mut store = ObjectStore::new();
        store.add(Object::new("Application", "a").with_single("peer", Some(id("Application", "b"))));
        store.add(Object::new("Application", "b").with_single("peer", Some(id("Application", "a"))));
        store.add(Object::new("Application", "self").with_single("peer", Some(id("Application", "self"))));

        let engine = RelationshipClosure::new(&catalog, &store);
        assert_eq!(engine.closure([&id("Application", "a")]).unwrap().len(), 2);
        assert_eq!(engine.closure([&id("Application", "self")]).unwrap().len(), 1);
    }

    #[test]
    fn test_diamond_reachability_deduplicates() {
        let catalog = catalog();
        let mut store = ObjectStore::new();
        store.add(
            Object::new("Segment", "top")
                .with_multi("segments", vec![id("Segment", "left"), id("Segment", "right")]),
        );
        store.add(Object::new("Segment", "left").with_multi("applications", vec![id("Application", "x")]));
        store.add(
            Object::new("Segment", "right")
                .with_single("controller", Some(id("Application", "x")))
                .with_multi("applications", vec![id("Application", "x"), id("Application", "x")]),
        );
        store.add(Object::new("Application", "x"));

        let closure = RelationshipClosure::new(&catalog, &store)
            .closure([&id("Segment", "top")])
            .unwrap();

        let xs = closure.iter().filter(|o| o.id == "x").count();
        assert_eq!(xs, 1);
        assert_eq!(closure.len(), 4);
    }

    #[test]
    fn test_empty_relationship_does_not_truncate() {
        let catalog = catalog();
        let mut store = ObjectStore::new();
        store.add(
            Object::new("Segment", "seg")
                .with_multi("segments", vec![])
                .with_multi("applications", vec![id("Application", "deep")]),
        );
        store.add(Object::new("Application", "deep").with_single("peer", Some(id("Application", "deeper"))));
        store.add(Object::new("Application", "deeper"));

        let closure = RelationshipClosure::new(&catalog, &store)
            .closure([&id("Segment", "seg")])
            .unwrap();
        assert!(closure.contains(&id("Application", "deeper")));
    }

    #[test]
    fn test_closure_is_idempotent() {
        let catalog = catalog();
        let mut store = ObjectStore::new();
        store.add(Object::new("Session", "s").with_single("segment", Some(id("Segment", "seg"))));
        store.add(Object::new("Segment", "seg").with_multi("segments", vec![id("Segment", "sub")]));
        store.add(Object::new("Segment", "sub").with_multi("segments", vec![id("Segment", "seg")]));

        let engine = RelationshipClosure::new(&catalog, &store);
        let once = engine.closure([&id("Session", "s")]).unwrap();
        let twice = engine.closure(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_dangling_reference_is_reported() {
        let catalog = catalog();
        let mut store = ObjectStore::new();
        store.add(Object::new("Segment", "seg").with_multi("applications", vec![id("Application", "gone")]));

        let err = RelationshipClosure::new(&catalog, &store)
            .closure([&id("Segment", "seg")])
            .unwrap_err();
        assert!(matches!(
            err,
            Error::DanglingReference { ref target, .. } if target == &id("Application", "gone")
        ));
    }

    #[test]
    fn test_missing_root_is_not_found() {
        let catalog = catalog();
        let store = ObjectStore::new();
        let err = RelationshipClosure::new(&catalog, &store)
            .closure([&id("Session", "nope")])
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_undeclared_relationship_is_rejected() {
        let catalog = catalog();
        let mut store = ObjectStore::new();
        store.add(Object::new("Session", "s").with_single("ghost", Some(id("Session", "nope"))));

        let err = RelationshipClosure::new(&catalog, &store)
            .closure([&id("Session", "s")])
            .unwrap_err();
        assert!(matches!(
            err,
            Error::UnknownRelationship { ref class, ref relationship }
                if class == "Session" && relationship == "ghost"
        ));
    }

    #[test]
    fn test_long_chain_does_not_recurse() {
        let catalog = catalog();
        let mut store = ObjectStore::new();
        let depth = 50_000;
        for i in 0..depth {
            store.add(
                Object::new("Application", format!("a{}", i))
                    .with_single("peer", Some(id("Application", &format!("a{}", i + 1)))),
            );
        }
        store.add(Object::new("Application", format!("a{}", depth)));

        let closure = RelationshipClosure::new(&catalog, &store)
            .closure([&id("Application", "a0")])
            .unwrap();
        assert_eq!(closure.len(), depth + 1);
    }
}
