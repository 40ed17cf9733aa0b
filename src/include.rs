//! Include Graph - file-to-file dependency edges
//!
//! Files are keyed by canonical path. Closures are computed with an explicit
//! worklist and visited set, so deep or cyclic include chains terminate and
//! never grow the call stack.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use serde::{Deserialize, Serialize};
use crate::{Error, Result};

/// What a file declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    /// Declares classes
    Schema,
    /// Declares object instances
    Data,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Schema => "schema",
            FileKind::Data => "data",
        }
    }
}

impl std::fmt::Display for FileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One file of the graph.
#[derive(Debug, Clone)]
pub struct FileNode {
    pub key: String,
    pub kind: FileKind,
    /// Canonical keys of the direct includes, in declaration order
    pub includes: Vec<String>,
    /// Include strings as written in the file
    pub declared: Vec<String>,
}

/// File-level dependency graph.
#[derive(Debug, Default)]
pub struct IncludeGraph {
    files: BTreeMap<String, FileNode>,
}

impl IncludeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file whose include strings are already canonical keys
    pub fn add_file(&mut self, key: impl Into<String>, kind: FileKind, includes: Vec<String>) {
        let key = key.into();
        self.files.insert(
            key.clone(),
            FileNode {
                key,
                kind,
                declared: includes.clone(),
                includes,
            },
        );
    }

    /// Add a file, keeping the include strings it was written with
    pub fn add_declared(
        &mut self,
        key: impl Into<String>,
        kind: FileKind,
        includes: Vec<String>,
        declared: Vec<String>,
    ) {
        let key = key.into();
        self.files.insert(
            key.clone(),
            FileNode {
                key,
                kind,
                includes,
                declared,
            },
        );
    }

    pub fn file(&self, key: &str) -> Option<&FileNode> {
        self.files.get(key)
    }

    fn require(&self, key: &str) -> Result<&FileNode> {
        self.files
            .get(key)
            .ok_or_else(|| Error::FileNotFound(key.to_string()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.files.contains_key(key)
    }

    pub fn kind(&self, key: &str) -> Option<FileKind> {
        self.files.get(key).map(|f| f.kind)
    }

    /// Immediate neighbours of a file
    pub fn direct_includes(&self, key: &str) -> Result<BTreeSet<&str>> {
        Ok(self
            .require(key)?
            .includes
            .iter()
            .map(String::as_str)
            .collect())
    }

    /// Transitive closure of a file, including the file itself
    pub fn closure(&self, root: &str) -> Result<BTreeSet<String>> {
        self.closure_of_all([root])
    }

    /// Transitive closure of a file, excluding the file itself
    pub fn includes_only(&self, root: &str) -> Result<BTreeSet<String>> {
        let mut files = self.closure(root)?;
        files.remove(root);
        Ok(files)
    }

    /// Union of the closures of every root (roots included)
    pub fn closure_of_all<'a>(&self, roots: impl IntoIterator<Item = &'a str>) -> Result<BTreeSet<String>> {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();

        for root in roots {
            let node = self.require(root)?;
            if visited.insert(node.key.as_str()) {
                queue.push_back(node.key.as_str());
            }
        }

        while let Some(current) = queue.pop_front() {
            let node = self.require(current)?;
            for include in &node.includes {
                let next = self.files.get(include).ok_or_else(|| Error::IncludeNotFound {
                    include: include.clone(),
                    from: current.to_string(),
                })?;
                if visited.insert(next.key.as_str()) {
                    queue.push_back(next.key.as_str());
                }
            }
        }

        Ok(visited.into_iter().map(str::to_string).collect())
    }

    /// Keep only the files of one kind
    pub fn of_kind<'a>(&self, files: impl IntoIterator<Item = &'a String>, kind: FileKind) -> BTreeSet<String> {
        files
            .into_iter()
            .filter(|f| self.kind(f) == Some(kind))
            .cloned()
            .collect()
    }

    /// All files, sorted by key
    pub fn files(&self) -> impl Iterator<Item = &FileNode> {
        self.files.values()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
