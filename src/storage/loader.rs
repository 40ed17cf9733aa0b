//! Database loading
//!
//! Files are read with a worklist keyed by canonical path, so each file is
//! parsed once however many times it is included. The schema catalog is
//! built only after every reachable file is read; objects are then checked
//! against it and their references verified.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use crate::closure::RelationshipClosure;
use crate::identity::ObjectId;
use crate::include::{FileKind, IncludeGraph};
use crate::mutator::{self, RelationshipMutator};
use crate::object::Object;
use crate::schema::{ClassDef, SchemaCatalog};
use crate::store::ObjectStore;
use crate::{Error, Result};
use super::format::{self, DataDocument, Document, ObjectDecl};
use super::search::{self, SearchPath};
use super::writer;

/// A loaded database: schema, objects and the include graph between files.
#[derive(Debug)]
pub struct Database {
    catalog: SchemaCatalog,
    store: ObjectStore,
    includes: IncludeGraph,
    search: SearchPath,
    roots: Vec<String>,
}

impl Database {
    /// Load a file and everything it includes
    pub fn open(path: &Path, search: SearchPath) -> Result<Self> {
        Self::open_many(&[path.to_path_buf()], search)
    }

    /// Load several root files into one database
    pub fn open_many(paths: &[PathBuf], search: SearchPath) -> Result<Self> {
        let mut includes = IncludeGraph::new();
        let mut classes: Vec<ClassDef> = Vec::new();
        let mut objects: Vec<(Object, String)> = Vec::new();

        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<PathBuf> = VecDeque::new();
        let mut roots = Vec::new();

        for path in paths {
            let key = search::file_key(path);
            if !Path::new(&key).is_file() {
                return Err(Error::FileNotFound(key));
            }
            roots.push(key.clone());
            if visited.insert(key.clone()) {
                queue.push_back(PathBuf::from(key));
            }
        }

        while let Some(path) = queue.pop_front() {
            let key = path.to_string_lossy().into_owned();
            let document = format::read_document(&path)?;

            let declared = document.includes().to_vec();
            let mut resolved = Vec::with_capacity(declared.len());
            for include in &declared {
                let found = search.resolve(include, &path).ok_or_else(|| Error::IncludeNotFound {
                    include: include.clone(),
                    from: key.clone(),
                })?;
                let include_key = found.to_string_lossy().into_owned();
                if visited.insert(include_key.clone()) {
                    queue.push_back(found);
                }
                resolved.push(include_key);
            }

            tracing::debug!("loaded {} {} ({} includes)", document.kind(), key, resolved.len());
            includes.add_declared(key.clone(), document.kind(), resolved, declared);

            match document {
                Document::Schema(schema) => {
                    classes.extend(schema.classes.into_iter().map(|c| c.in_file(key.clone())));
                }
                Document::Data(data) => {
                    objects.extend(data.objects.into_iter().map(|o| (Object::from(o), key.clone())));
                }
            }
        }

        let catalog = SchemaCatalog::from_classes(classes)?;

        let mut store = ObjectStore::new();
        for (mut object, file) in objects {
            mutator::check_object(&catalog, &mut object)?;
            let id = object.id.clone();
            if !store.add_from(object, file.clone()) {
                tracing::warn!(
                    "{} defined again in {}; keeping the definition from {}",
                    id,
                    file,
                    store.origin(&id).unwrap_or("<unknown>")
                );
            }
        }

        let db = Self {
            catalog,
            store,
            includes,
            search,
            roots,
        };
        db.check_references()?;

        tracing::info!(
            "opened database: {} files, {} classes, {} objects",
            db.includes.len(),
            db.catalog.len(),
            db.store.len()
        );
        Ok(db)
    }

    /// Every reference must resolve, and to an object whose file is reachable
    /// from the referencing object's file.
    fn check_references(&self) -> Result<()> {
        let mut scopes: HashMap<&str, BTreeSet<String>> = HashMap::new();

        for object in self.store.all() {
            for (relationship, target) in object.references() {
                if !self.store.contains(target) {
                    return Err(Error::DanglingReference {
                        from: object.id.clone(),
                        relationship: relationship.to_string(),
                        target: target.clone(),
                    });
                }

                let (Some(file), Some(target_file)) =
                    (self.store.origin(&object.id), self.store.origin(target))
                else {
                    continue;
                };
                if !scopes.contains_key(file) {
                    scopes.insert(file, self.includes.closure(file)?);
                }
                let in_scope = scopes
                    .get(file)
                    .map(|scope| scope.contains(target_file))
                    .unwrap_or(false);
                if !in_scope {
                    return Err(Error::OutOfScope {
                        from: object.id.clone(),
                        target: target.clone(),
                        file: file.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ObjectStore {
        &mut self.store
    }

    pub fn includes(&self) -> &IncludeGraph {
        &self.includes
    }

    pub fn search(&self) -> &SearchPath {
        &self.search
    }

    /// Canonical keys of the files the database was opened with
    pub fn roots(&self) -> &[String] {
        &self.roots
    }

    /// Canonical key of a loaded file
    pub fn file_key(&self, path: &Path) -> Result<String> {
        let key = search::file_key(path);
        if self.includes.contains(&key) {
            Ok(key)
        } else {
            Err(Error::FileNotFound(key))
        }
    }

    pub fn get(&self, id: &ObjectId) -> Result<&Object> {
        self.store.require(id)
    }

    pub fn closure(&self) -> RelationshipClosure<'_> {
        RelationshipClosure::new(&self.catalog, &self.store)
    }

    /// Edit relationships, keeping every new reference within the include
    /// closure of the edited object's file
    pub fn mutator(&mut self) -> RelationshipMutator<'_> {
        RelationshipMutator::new(&self.catalog, &mut self.store).with_scope(&self.includes)
    }

    /// Rewrite a data file from the current state of the objects it defines.
    ///
    /// Includes are written back as they were declared.
    pub fn save(&self, key: &str) -> Result<String> {
        let node = self.includes.file(key).ok_or_else(|| Error::FileNotFound(key.to_string()))?;
        if node.kind != FileKind::Data {
            return Err(Error::Format(format!("{} is not a data file", key)));
        }

        let objects = self
            .store
            .all()
            .filter(|o| self.store.origin(&o.id) == Some(key))
            .map(ObjectDecl::from)
            .collect();
        let document = Document::Data(DataDocument {
            includes: node.declared.clone(),
            objects,
        });

        let digest = writer::publish(Path::new(key), &format::to_json_bytes(&document)?)?;
        tracing::info!("saved {}", key);
        Ok(digest)
    }

    pub fn stats(&self) -> DatabaseStats {
        let schema_files = self.includes.files().filter(|f| f.kind == FileKind::Schema).count();
        let store = self.store.stats();
        DatabaseStats {
            schema_files,
            data_files: self.includes.len() - schema_files,
            classes: self.catalog.len(),
            objects: store.objects,
            references: store.references,
        }
    }
}

/// Statistics about a loaded database
#[derive(Debug, Clone, serde::Serialize)]
pub struct DatabaseStats {
    pub schema_files: usize,
    pub data_files: usize,
    pub classes: usize,
    pub objects: usize,
    pub references: usize,
}

impl std::fmt::Display for DatabaseStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Database Statistics:")?;
        writeln!(f, "  Schema files: {}", self.schema_files)?;
        writeln!(f, "  Data files: {}", self.data_files)?;
        writeln!(f, "  Classes: {}", self.classes)?;
        writeln!(f, "  Objects: {}", self.objects)?;
        writeln!(f, "  References: {}", self.references)
    }
}
