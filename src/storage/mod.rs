//! Storage Layer - JSON files on disk
//!
//! A database is a set of files connected by includes:
//! - schema files declaring classes
//! - data files declaring objects
//!
//! Every write goes through an atomic temp-file-and-rename publish.

pub mod format;
pub mod loader;
pub mod search;
pub mod writer;

pub use format::{DataDocument, Document, ObjectDecl, SchemaDocument};
pub use loader::{Database, DatabaseStats};
pub use search::SearchPath;
