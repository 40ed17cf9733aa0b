//! On-disk document format
//!
//! Every file is one JSON document tagged by `kind`:
//!
//! ```json
//! {"kind": "schema", "includes": [...], "classes": [...]}
//! {"kind": "data",   "includes": [...], "objects": [...]}
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use serde::{Deserialize, Serialize};
use crate::identity::ObjectId;
use crate::include::FileKind;
use crate::object::{Object, RelationshipValue, Value};
use crate::schema::ClassDef;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Document {
    Schema(SchemaDocument),
    Data(DataDocument),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaDocument {
    #[serde(default)]
    pub includes: Vec<String>,
    #[serde(default)]
    pub classes: Vec<ClassDef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataDocument {
    #[serde(default)]
    pub includes: Vec<String>,
    #[serde(default)]
    pub objects: Vec<ObjectDecl>,
}

/// One object as written in a data file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectDecl {
    pub class: String,
    pub id: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
    #[serde(default)]
    pub relationships: BTreeMap<String, RelationshipValue>,
}

impl Document {
    pub fn kind(&self) -> FileKind {
        match self {
            Document::Schema(_) => FileKind::Schema,
            Document::Data(_) => FileKind::Data,
        }
    }

    pub fn includes(&self) -> &[String] {
        match self {
            Document::Schema(doc) => &doc.includes,
            Document::Data(doc) => &doc.includes,
        }
    }

    pub fn set_includes(&mut self, includes: Vec<String>) {
        match self {
            Document::Schema(doc) => doc.includes = includes,
            Document::Data(doc) => doc.includes = includes,
        }
    }
}

impl From<&Object> for ObjectDecl {
    fn from(object: &Object) -> Self {
        Self {
            class: object.id.class.clone(),
            id: object.id.id.clone(),
            attributes: object.attributes.clone(),
            relationships: object.relationships.clone(),
        }
    }
}

impl From<ObjectDecl> for Object {
    fn from(decl: ObjectDecl) -> Self {
        Self {
            id: ObjectId::new(decl.class, decl.id),
            attributes: decl.attributes,
            relationships: decl.relationships,
        }
    }
}

/// Read and parse one file
pub fn read_document(path: &Path) -> Result<Document> {
    let bytes = std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::FileNotFound(path.display().to_string()),
        _ => Error::Io(e),
    })?;
    serde_json::from_slice(&bytes)
        .map_err(|e| Error::Format(format!("{}: {}", path.display(), e)))
}

/// Pretty JSON with a trailing newline.
///
/// Maps are ordered, so equal documents always render to equal bytes.
pub fn to_json_bytes(document: &Document) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec_pretty(document)?;
    bytes.push(b'\n');
    Ok(bytes)
}
