//! Include resolution and canonical file keys

use std::path::{Component, Path, PathBuf};
use crate::config::{ConfgraphConfig, DB_PATH_ENV};

/// Ordered list of directories searched for include strings
#[derive(Debug, Clone, Default)]
pub struct SearchPath {
    dirs: Vec<PathBuf>,
}

impl SearchPath {
    pub fn new<P: AsRef<Path>>(dirs: impl IntoIterator<Item = P>) -> Self {
        Self {
            dirs: dirs.into_iter().map(|d| normalize(d.as_ref())).collect(),
        }
    }

    /// Configured directories first, then `CONFGRAPH_DB_PATH`
    pub fn from_config(config: &ConfgraphConfig) -> Self {
        Self::from_parts(&config.search_path, std::env::var(DB_PATH_ENV).ok().as_deref())
    }

    fn from_parts(configured: &[PathBuf], env: Option<&str>) -> Self {
        let mut dirs: Vec<PathBuf> = configured.to_vec();
        if let Some(value) = env {
            dirs.extend(
                value
                    .split(':')
                    .filter(|s| !s.is_empty())
                    .map(PathBuf::from),
            );
        }
        Self::new(dirs)
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Resolve an include written in `from`.
    ///
    /// Tried in order: next to `from`, each search directory, then one
    /// sub-directory level below each search directory.
    pub fn resolve(&self, include: &str, from: &Path) -> Option<PathBuf> {
        let candidate = Path::new(include);
        if candidate.is_absolute() {
            return candidate.is_file().then(|| normalize(candidate));
        }

        let beside = from.parent().map(|dir| dir.join(candidate));
        let direct = beside
            .into_iter()
            .chain(self.dirs.iter().map(|dir| dir.join(candidate)));
        for path in direct {
            if path.is_file() {
                return Some(normalize(&path));
            }
        }

        for dir in &self.dirs {
            let pattern = format!(
                "{}/*/{}",
                glob::Pattern::escape(&dir.to_string_lossy()),
                glob::Pattern::escape(include)
            );
            let Ok(paths) = glob::glob(&pattern) else {
                continue;
            };
            if let Some(found) = paths.filter_map(|p| p.ok()).find(|p| p.is_file()) {
                tracing::debug!("resolved {} via sub-directory search: {}", include, found.display());
                return Some(normalize(&found));
            }
        }

        None
    }

    /// Include string to write for a file key: relative to the first search
    /// directory containing it, else the key itself
    pub fn display_name(&self, key: &str) -> String {
        self.dirs
            .iter()
            .find_map(|dir| Path::new(key).strip_prefix(dir).ok())
            .map(|rel| rel.to_string_lossy().into_owned())
            .unwrap_or_else(|| key.to_string())
    }
}

/// Absolute path with `.` and `..` removed lexically
pub fn normalize(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Canonical key of a file
pub fn file_key(path: &Path) -> String {
    normalize(path).to_string_lossy().into_owned()
}
