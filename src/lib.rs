//! # Confgraph - Typed configuration object database
//!
//! File-partitioned relational object database for hierarchical system
//! configurations.
//!
//! Confgraph provides:
//! - A schema catalog of classes with typed attributes and relationships
//! - An object store keyed by `(class, id)` identity
//! - Include-graph and relationship-graph closures that are cycle safe
//! - Consolidation of a closure into a minimal, self-contained database
//! - Validated relationship editing for interactive clients

pub mod identity;
pub mod object;
pub mod schema;
pub mod store;
pub mod include;
pub mod closure;
pub mod consolidate;
pub mod mutator;
pub mod storage;
pub mod config;
pub mod output;
pub mod ui;

// Re-exports for convenient access
pub use identity::ObjectId;
pub use object::{Object, RelationshipValue, Value};
pub use schema::{AttributeKind, ClassDef, Multiplicity, RelationshipSpec, SchemaCatalog};
pub use store::ObjectStore;
pub use include::{FileKind, IncludeGraph};
pub use closure::{ObjectClosure, RelationshipClosure};
pub use consolidate::{Consolidator, WrittenDatabase};
pub use mutator::{NotNullViolation, RelationshipMutator};
pub use storage::{Database, SearchPath};

/// Result type alias for Confgraph operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Confgraph operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid object identity: {0}")]
    InvalidIdentity(String),

    #[error("Class not found: {0}")]
    ClassNotFound(String),

    #[error("Object not found: {0}")]
    ObjectNotFound(ObjectId),

    #[error("File not loaded: {0}")]
    FileNotFound(String),

    #[error("Cannot resolve include '{include}' from {from}")]
    IncludeNotFound { include: String, from: String },

    #[error("Object already exists: {0}")]
    DuplicateObject(ObjectId),

    #[error("Dangling reference: {from}.{relationship} -> {target}")]
    DanglingReference {
        from: ObjectId,
        relationship: String,
        target: ObjectId,
    },

    #[error("{from} references {target}, whose file is not included by {file}")]
    OutOfScope {
        from: ObjectId,
        target: ObjectId,
        file: String,
    },

    #[error("Class {class} has no relationship '{relationship}'")]
    UnknownRelationship { class: String, relationship: String },

    #[error("Class {class} has no attribute '{attribute}'")]
    UnknownAttribute { class: String, attribute: String },

    #[error("Type mismatch for '{name}': expected {expected}, found {found}")]
    TypeMismatch {
        name: String,
        expected: String,
        found: String,
    },

    #[error("Cardinality violation: single-valued relationship '{relationship}' given {count} values")]
    CardinalityViolation { relationship: String, count: usize },

    #[error("{object}.{relationship} does not reference {target}")]
    ReferenceNotPresent {
        object: ObjectId,
        relationship: String,
        target: ObjectId,
    },

    #[error("{} not-null violation(s): {}", .0.len(), mutator::describe_violations(.0))]
    NotNullViolations(Vec<NotNullViolation>),

    #[error("Inheritance cycle involving class {0}")]
    InheritanceCycle(String),

    #[error("Format error: {0}")]
    Format(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to publish {path}: {source}")]
    Publish {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Unknown class, unknown identity or unresolvable include
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::ClassNotFound(_)
                | Error::ObjectNotFound(_)
                | Error::FileNotFound(_)
                | Error::IncludeNotFound { .. }
        )
    }
}
