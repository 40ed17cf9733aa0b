//! Schema layer - class descriptors and the catalog that flattens them
//!
//! Every class carries:
//! - typed attributes (name → scalar kind)
//! - relationship specs (target class, multiplicity, not-null)
//! - zero or more superclasses (acyclic)

pub mod catalog;

pub use catalog::{AttributeKind, ClassDef, Multiplicity, RelationshipSpec, SchemaCatalog};
