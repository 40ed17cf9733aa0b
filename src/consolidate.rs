//! Consolidator - materialize a closure as a new self-contained database
//!
//! Output is deterministic: objects are emitted in `(class, id)` order and
//! includes in canonical key order, so consolidating the same input twice
//! yields byte-identical files. Nothing is written until every step has
//! succeeded, and then only through an atomic publish.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use crate::identity::ObjectId;
use crate::include::FileKind;
use crate::storage::format::{self, DataDocument, Document, ObjectDecl};
use crate::storage::writer::{self, Batch};
use crate::storage::Database;
use crate::{Error, Result};

/// Summary of one published database file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WrittenDatabase {
    pub path: PathBuf,
    /// Include strings as written
    pub includes: Vec<String>,
    /// Objects written, in emission order
    pub objects: Vec<ObjectId>,
    /// blake3 hex digest of the file contents
    pub digest: String,
}

/// Writes subsets of a loaded database to new files
pub struct Consolidator<'a> {
    db: &'a Database,
}

impl<'a> Consolidator<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Extract the closure of the given roots into `output`.
    ///
    /// Data root files add every object defined in their include closure to
    /// the roots. Schema root files, when given, fix the schema include set
    /// to their closure; it must declare every class written. Without them
    /// the includes are the files declaring each written class, its
    /// ancestors and, transitively, the target classes of their
    /// relationships, so the output reopens on its own.
    pub fn consolidate(
        &self,
        root_files: &[String],
        root_objects: &[ObjectId],
        output: &Path,
    ) -> Result<WrittenDatabase> {
        let includes = self.db.includes();
        let mut schema_roots = Vec::new();
        let mut data_roots = Vec::new();
        for file in root_files {
            match includes.kind(file) {
                Some(FileKind::Schema) => schema_roots.push(file.as_str()),
                Some(FileKind::Data) => data_roots.push(file.as_str()),
                None => return Err(Error::FileNotFound(file.clone())),
            }
        }

        let mut roots: BTreeSet<ObjectId> = root_objects.iter().cloned().collect();
        if !data_roots.is_empty() {
            let files = includes.closure_of_all(data_roots)?;
            roots.extend(self.db.store().defined_in(&files).into_iter().cloned());
        }

        let objects = self.db.closure().closure(&roots)?;
        let classes = self.db.catalog().dependencies(objects.classes())?;

        let schema_files = if schema_roots.is_empty() {
            self.declaring_files(&classes)?
        } else {
            self.covering_files(schema_roots, &classes)?
        };

        tracing::info!(
            "consolidating {} objects of {} classes into {}",
            objects.len(),
            classes.len(),
            output.display()
        );
        self.write(objects.iter(), &schema_files, output)
    }

    /// Consolidate everything reachable from one data file, with schema
    /// files as the only includes
    pub fn flatten(&self, data_file: &str, output: &Path) -> Result<WrittenDatabase> {
        let includes = self.db.includes();
        if includes.kind(data_file) != Some(FileKind::Data) {
            return Err(Error::Format(format!("{} is not a loaded data file", data_file)));
        }

        let files = includes.closure(data_file)?;
        let defined = self.db.store().defined_in(&files);
        let objects = self.db.closure().closure(defined)?;
        let schema_files = includes.of_kind(&files, FileKind::Schema);

        self.write(objects.iter(), &schema_files, output)
    }

    /// Combine the objects defined in `inputs` into one file that includes
    /// whatever the inputs included, minus the inputs themselves
    pub fn merge(&self, inputs: &[String], output: &Path) -> Result<WrittenDatabase> {
        let includes = self.db.includes();
        let input_set: BTreeSet<String> = inputs.iter().cloned().collect();
        for input in &input_set {
            if !includes.contains(input) {
                return Err(Error::FileNotFound(input.clone()));
            }
        }

        let mut kept = includes.closure_of_all(input_set.iter().map(String::as_str))?;
        kept.retain(|file| !input_set.contains(file));

        let objects = self.db.store().defined_in(&input_set);
        self.write(objects.into_iter(), &kept, output)
    }

    /// Copy data files, and transitively their data includes, into
    /// `dest_dir`.
    ///
    /// Data includes are rewritten to point at the copies; schema includes
    /// are written as absolute paths. Every copy is staged first and the set
    /// is published only if all of them were written.
    pub fn copy_configuration(&self, dest_dir: &Path, inputs: &[String]) -> Result<Vec<WrittenDatabase>> {
        let includes = self.db.includes();
        std::fs::create_dir_all(dest_dir)?;

        let mut targets: BTreeMap<String, PathBuf> = BTreeMap::new();
        let mut taken: HashSet<PathBuf> = HashSet::new();
        let mut queue: VecDeque<String> = VecDeque::new();

        for input in inputs {
            if includes.kind(input) != Some(FileKind::Data) {
                return Err(Error::Format(format!("{} is not a loaded data file", input)));
            }
            if !targets.contains_key(input) {
                targets.insert(input.clone(), unique_target(dest_dir, input, &mut taken));
                queue.push_back(input.clone());
            }
        }

        let mut batch = Batch::new();
        let mut written = Vec::new();

        while let Some(key) = queue.pop_front() {
            let node = includes.file(&key).ok_or_else(|| Error::FileNotFound(key.clone()))?;

            let mut rewritten: Vec<String> = Vec::new();
            for include in &node.includes {
                let entry = match includes.kind(include) {
                    Some(FileKind::Data) => {
                        if !targets.contains_key(include) {
                            targets.insert(include.clone(), unique_target(dest_dir, include, &mut taken));
                            queue.push_back(include.clone());
                        }
                        targets
                            .get(include)
                            .and_then(|p| p.file_name())
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_else(|| include.clone())
                    }
                    _ => include.clone(),
                };
                if !rewritten.contains(&entry) {
                    rewritten.push(entry);
                }
            }

            let mut document = format::read_document(Path::new(&key))?;
            document.set_includes(rewritten.clone());
            let objects = match &document {
                Document::Data(data) => data
                    .objects
                    .iter()
                    .map(|o| ObjectId::new(o.class.clone(), o.id.clone()))
                    .collect(),
                Document::Schema(_) => Vec::new(),
            };

            let path = targets.get(&key).cloned().ok_or_else(|| Error::FileNotFound(key.clone()))?;
            let digest = batch.stage(&path, &format::to_json_bytes(&document)?)?;
            tracing::debug!("staged copy of {} as {}", key, path.display());

            written.push(WrittenDatabase {
                path,
                includes: rewritten,
                objects,
                digest,
            });
        }

        batch.commit()?;
        tracing::info!("copied {} data files into {}", written.len(), dest_dir.display());
        Ok(written)
    }

    fn declaring_files(&self, classes: &BTreeSet<String>) -> Result<BTreeSet<String>> {
        classes
            .iter()
            .map(|class| {
                self.db
                    .catalog()
                    .defining_file(class)
                    .map(str::to_string)
                    .ok_or_else(|| Error::ClassNotFound(class.clone()))
            })
            .collect()
    }

    fn covering_files(&self, schema_roots: Vec<&str>, classes: &BTreeSet<String>) -> Result<BTreeSet<String>> {
        let includes = self.db.includes();
        let closure = includes.closure_of_all(schema_roots)?;
        let files = includes.of_kind(&closure, FileKind::Schema);

        for class in classes {
            let covered = self
                .db
                .catalog()
                .defining_file(class)
                .map(|f| files.contains(f))
                .unwrap_or(false);
            if !covered {
                return Err(Error::ClassNotFound(class.clone()));
            }
        }
        Ok(files)
    }

    fn write<'o>(
        &self,
        objects: impl Iterator<Item = &'o ObjectId>,
        includes: &BTreeSet<String>,
        output: &Path,
    ) -> Result<WrittenDatabase> {
        let store = self.db.store();
        let mut ids = Vec::new();
        let mut decls = Vec::new();
        for id in objects {
            decls.push(ObjectDecl::from(store.require(id)?));
            ids.push(id.clone());
        }

        let includes: Vec<String> = includes
            .iter()
            .map(|key| self.db.search().display_name(key))
            .collect();
        let document = Document::Data(DataDocument {
            includes: includes.clone(),
            objects: decls,
        });

        let digest = writer::publish(output, &format::to_json_bytes(&document)?)?;
        tracing::info!("wrote {} objects to {}", ids.len(), output.display());

        Ok(WrittenDatabase {
            path: output.to_path_buf(),
            includes,
            objects: ids,
            digest,
        })
    }
}

fn unique_target(dest_dir: &Path, key: &str, taken: &mut HashSet<PathBuf>) -> PathBuf {
    let source = Path::new(key);
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "data".to_string());
    let extension = source
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut candidate = dest_dir.join(format!("{}{}", stem, extension));
    let mut n = 1;
    while taken.contains(&candidate) {
        candidate = dest_dir.join(format!("{}_{}{}", stem, n, extension));
        n += 1;
    }
    taken.insert(candidate.clone());
    candidate
}

/// Default output name for an extracted sub-configuration
pub fn timestamped_output(path: &Path) -> PathBuf {
    timestamped_output_at(path, Local::now().naive_local())
}

/// `<stem>_<timestamp>.json` beside `path`, with `:` replaced by `.`
pub fn timestamped_output_at(path: &Path, at: NaiveDateTime) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "extract".to_string());
    let stamp = at.format("%Y-%m-%dT%H:%M:%S").to_string().replace(':', ".");
    path.with_file_name(format!("{}_{}.json", stem, stamp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::search::{self, SearchPath};
    use serde_json::json;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, value: serde_json::Value) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, serde_json::to_vec_pretty(&value).unwrap()).unwrap();
        path
    }

    fn key(dir: &Path, name: &str) -> String {
        search::file_key(&dir.join(name))
    }

    fn id(class: &str, name: &str) -> ObjectId {
        ObjectId::new(class, name)
    }

    /// Session -> Segment -> {App1, App2}, spread over three schema files
    /// and two data files
    fn fixture(dir: &Path) -> Database {
        write(dir, "core.schema.json", json!({
            "kind": "schema",
            "classes": [
                {"name": "Resource"},
                {"name": "Application", "superclasses": ["Resource"], "attributes": {"port": "integer"}}
            ]
        }));
        write(dir, "daq.schema.json", json!({
            "kind": "schema",
            "includes": ["core.schema.json"],
            "classes": [
                {"name": "Segment", "superclasses": ["Resource"], "relationships": {
                    "controller": {"class": "Application", "multiplicity": "single", "not_null": true},
                    "applications": {"class": "Application", "multiplicity": "multi"}
                }},
                {"name": "Session", "relationships": {
                    "segment": {"class": "Segment", "multiplicity": "single", "not_null": true},
                    "disabled": {"class": "Resource", "multiplicity": "multi"}
                }}
            ]
        }));
        write(dir, "hw.schema.json", json!({
            "kind": "schema",
            "classes": [{"name": "Host"}]
        }));
        write(dir, "apps.data.json", json!({
            "kind": "data",
            "includes": ["core.schema.json"],
            "objects": [
                {"class": "Application", "id": "App2", "attributes": {"port": 2}},
                {"class": "Application", "id": "App1", "attributes": {"port": 1}},
                {"class": "Application", "id": "Unused"}
            ]
        }));
        let top = write(dir, "session.data.json", json!({
            "kind": "data",
            "includes": ["daq.schema.json", "hw.schema.json", "apps.data.json"],
            "objects": [
                {"class": "Session", "id": "S", "relationships": {"segment": "Seg@Segment"}},
                {"class": "Segment", "id": "Seg", "relationships": {
                    "controller": "App1@Application",
                    "applications": ["App1@Application", "App2@Application", "App1@Application"]
                }},
                {"class": "Host", "id": "h1"}
            ]
        }));

        Database::open(&top, SearchPath::default()).unwrap()
    }

    #[test]
    fn test_consolidate_session_closure() {
        let tmp = TempDir::new().unwrap();
        let db = fixture(tmp.path());
        let output = tmp.path().join("out.json");

        let written = Consolidator::new(&db)
            .consolidate(&[], &[id("Session", "S")], &output)
            .unwrap();

        assert_eq!(
            written.objects,
            vec![
                id("Application", "App1"),
                id("Application", "App2"),
                id("Segment", "Seg"),
                id("Session", "S"),
            ]
        );
        let mut expected = vec![key(tmp.path(), "core.schema.json"), key(tmp.path(), "daq.schema.json")];
        expected.sort();
        assert_eq!(written.includes, expected);
        assert_eq!(written.digest, writer::digest(&std::fs::read(&output).unwrap()));

        let reopened = Database::open(&output, SearchPath::default()).unwrap();
        assert_eq!(reopened.store().defined_in(&BTreeSet::from([search::file_key(&output)])).len(), 4);
    }

    #[test]
    fn test_consolidate_is_byte_identical() {
        let tmp = TempDir::new().unwrap();
        let db = fixture(tmp.path());
        let consolidator = Consolidator::new(&db);
        let first = tmp.path().join("first.json");
        let second = tmp.path().join("second.json");

        consolidator.consolidate(&[], &[id("Session", "S")], &first).unwrap();
        consolidator
            .consolidate(&[], &[id("Session", "S"), id("Segment", "Seg")], &second)
            .unwrap();
        assert_eq!(std::fs::read(&first).unwrap(), std::fs::read(&second).unwrap());
    }

    #[test]
    fn test_failed_consolidation_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let mut db = fixture(tmp.path());
        db.store_mut().remove(&id("Application", "App2")).unwrap();
        let output = tmp.path().join("out.json");

        let err = Consolidator::new(&db)
            .consolidate(&[], &[id("Session", "S")], &output)
            .unwrap_err();
        assert!(matches!(err, Error::DanglingReference { .. }));
        assert!(!output.exists());
    }

    #[test]
    fn test_schema_roots_must_cover_classes() {
        let tmp = TempDir::new().unwrap();
        let db = fixture(tmp.path());
        let output = tmp.path().join("out.json");
        let consolidator = Consolidator::new(&db);

        let err = consolidator
            .consolidate(&[key(tmp.path(), "core.schema.json")], &[id("Session", "S")], &output)
            .unwrap_err();
        assert!(matches!(err, Error::ClassNotFound(_)));
        assert!(!output.exists());

        let written = consolidator
            .consolidate(
                &[key(tmp.path(), "daq.schema.json"), key(tmp.path(), "hw.schema.json")],
                &[id("Session", "S")],
                &output,
            )
            .unwrap();
        assert_eq!(written.includes.len(), 3);
    }

    #[test]
    fn test_output_includes_relationship_target_schemas() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path();
        write(dir, "hw.schema.json", json!({
            "kind": "schema",
            "classes": [{"name": "Host"}]
        }));
        // Declares a relationship to Host without including hw.schema.json
        write(dir, "s.schema.json", json!({
            "kind": "schema",
            "classes": [{"name": "Session", "relationships": {
                "host": {"class": "Host", "multiplicity": "single"}
            }}]
        }));
        let top = write(dir, "s.data.json", json!({
            "kind": "data",
            "includes": ["hw.schema.json", "s.schema.json"],
            "objects": [{"class": "Session", "id": "s"}]
        }));
        let db = Database::open(&top, SearchPath::default()).unwrap();
        let output = dir.join("s.out.json");

        let written = Consolidator::new(&db)
            .consolidate(&[], &[id("Session", "s")], &output)
            .unwrap();
        assert_eq!(written.objects, vec![id("Session", "s")]);
        assert!(written.includes.contains(&key(dir, "hw.schema.json")));

        let reopened = Database::open(&output, SearchPath::default()).unwrap();
        assert!(reopened.catalog().get("Host").is_some());
    }

    #[test]
    fn test_undeclared_relationship_is_never_published() {
        let tmp = TempDir::new().unwrap();
        let mut db = fixture(tmp.path());
        db.store_mut().add(
            crate::Object::new("Session", "adhoc").with_single("ghost", Some(id("Session", "nope"))),
        );
        let output = tmp.path().join("ghost.json");

        let err = Consolidator::new(&db)
            .consolidate(&[], &[id("Session", "adhoc")], &output)
            .unwrap_err();
        assert!(matches!(err, Error::UnknownRelationship { .. }));
        assert!(!output.exists());
    }

    #[test]
    fn test_data_root_contributes_its_objects() {
        let tmp = TempDir::new().unwrap();
        let db = fixture(tmp.path());
        let written = Consolidator::new(&db)
            .consolidate(&[key(tmp.path(), "apps.data.json")], &[], &tmp.path().join("apps.out.json"))
            .unwrap();

        assert_eq!(written.objects.len(), 3);
        assert_eq!(written.includes, vec![key(tmp.path(), "core.schema.json")]);
    }

    #[test]
    fn test_flatten_keeps_only_schema_includes() {
        let tmp = TempDir::new().unwrap();
        let db = fixture(tmp.path());
        let written = Consolidator::new(&db)
            .flatten(&key(tmp.path(), "session.data.json"), &tmp.path().join("flat.json"))
            .unwrap();

        assert_eq!(written.objects.len(), 6);
        assert_eq!(written.includes.len(), 3);
        assert!(written.includes.iter().all(|i| i.ends_with(".schema.json")));
    }

    #[test]
    fn test_merge_drops_inputs_from_includes() {
        let tmp = TempDir::new().unwrap();
        let db = fixture(tmp.path());
        let inputs = [key(tmp.path(), "session.data.json"), key(tmp.path(), "apps.data.json")];
        let output = tmp.path().join("merged.json");

        let written = Consolidator::new(&db).merge(&inputs, &output).unwrap();
        assert_eq!(written.objects.len(), 6);
        assert!(!written.includes.iter().any(|i| inputs.contains(i)));

        let reopened = Database::open(&output, SearchPath::default()).unwrap();
        assert_eq!(reopened.store().len(), 6);
    }

    #[test]
    fn test_copy_configuration_rewrites_data_includes() {
        let tmp = TempDir::new().unwrap();
        let db = fixture(tmp.path());
        let dest = tmp.path().join("copy");

        let written = Consolidator::new(&db)
            .copy_configuration(&dest, &[key(tmp.path(), "session.data.json")])
            .unwrap();
        assert_eq!(written.len(), 2);
        assert!(written[0].includes.contains(&"apps.data.json".to_string()));
        assert!(written[0].includes.contains(&key(tmp.path(), "daq.schema.json")));

        let reopened = Database::open(&dest.join("session.data.json"), SearchPath::default()).unwrap();
        assert_eq!(reopened.store().len(), 6);
        assert!(reopened.includes().contains(&search::file_key(&dest.join("apps.data.json"))));
    }

    #[test]
    fn test_timestamped_output() {
        let at = NaiveDateTime::parse_from_str("2024-01-02 03:04:05", "%Y-%m-%d %H:%M:%S").unwrap();
        let path = timestamped_output_at(Path::new("/tmp/out/extract.json"), at);
        assert_eq!(path, PathBuf::from("/tmp/out/extract_2024-01-02T03.04.05.json"));
    }

    #[test]
    fn test_unique_target_avoids_collisions() {
        let mut taken = HashSet::new();
        let dest = Path::new("/dest");
        assert_eq!(unique_target(dest, "/a/x.json", &mut taken), PathBuf::from("/dest/x.json"));
        assert_eq!(unique_target(dest, "/b/x.json", &mut taken), PathBuf::from("/dest/x_1.json"));
    }
}
