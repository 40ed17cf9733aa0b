//! Atomic publication of output files
//!
//! Bytes are written to a temporary file in the destination directory and
//! renamed over the target only after the write has fully succeeded. A
//! failure at any point drops the temporary file, leaving the target as it
//! was. A `Batch` that fails partway through its renames puts back what it
//! already replaced.

use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempPath};
use crate::{Error, Result};

/// blake3 hex digest of published bytes
pub fn digest(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn publish_error(path: &Path) -> impl Fn(std::io::Error) -> Error + '_ {
    move |source| Error::Publish {
        path: path.display().to_string(),
        source,
    }
}

fn stage_file(path: &Path, bytes: &[u8]) -> Result<NamedTempFile> {
    let publish_err = publish_error(path);
    let mut temp = NamedTempFile::new_in(parent_dir(path)).map_err(&publish_err)?;
    temp.write_all(bytes).map_err(&publish_err)?;
    temp.as_file().sync_all().map_err(&publish_err)?;
    Ok(temp)
}

fn commit(path: &Path, temp: NamedTempFile) -> Result<()> {
    temp.persist(path).map_err(|e| Error::Publish {
        path: path.display().to_string(),
        source: e.error,
    })?;
    Ok(())
}

/// Write `bytes` to `path` atomically; returns the digest of the bytes
pub fn publish(path: &Path, bytes: &[u8]) -> Result<String> {
    let temp = stage_file(path, bytes)?;
    commit(path, temp)?;
    tracing::debug!("published {} ({} bytes)", path.display(), bytes.len());
    Ok(digest(bytes))
}

/// Several files staged together and published only once all are written.
#[derive(Default)]
pub struct Batch {
    staged: Vec<(PathBuf, NamedTempFile)>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write one file to its temporary location; returns its digest
    pub fn stage(&mut self, path: &Path, bytes: &[u8]) -> Result<String> {
        let temp = stage_file(path, bytes)?;
        self.staged.push((path.to_path_buf(), temp));
        Ok(digest(bytes))
    }

    /// Rename every staged file into place.
    ///
    /// If a rename fails, files already published are removed and the
    /// files they replaced restored before the error is returned.
    pub fn commit(self) -> Result<Vec<PathBuf>> {
        let mut published: Vec<(PathBuf, Option<TempPath>)> = Vec::with_capacity(self.staged.len());
        for (path, temp) in self.staged {
            match replace(&path, temp) {
                Ok(backup) => published.push((path, backup)),
                Err(e) => {
                    rollback(published);
                    return Err(e);
                }
            }
        }
        Ok(published.into_iter().map(|(path, _)| path).collect())
    }
}

/// Publish one staged file, keeping the file it replaces aside until the
/// whole batch has gone through
fn replace(path: &Path, temp: NamedTempFile) -> Result<Option<TempPath>> {
    let backup = if path.is_file() {
        let publish_err = publish_error(path);
        let backup = NamedTempFile::new_in(parent_dir(path))
            .map_err(&publish_err)?
            .into_temp_path();
        std::fs::rename(path, &backup).map_err(&publish_err)?;
        Some(backup)
    } else {
        None
    };

    if let Err(e) = commit(path, temp) {
        if let Some(backup) = backup {
            if let Err(restore) = backup.persist(path) {
                tracing::warn!("could not restore {}: {}", path.display(), restore.error);
            }
        }
        return Err(e);
    }
    Ok(backup)
}

fn rollback(published: Vec<(PathBuf, Option<TempPath>)>) {
    for (path, backup) in published.into_iter().rev() {
        let restored = match backup {
            Some(backup) => backup.persist(&path).map_err(|e| e.error),
            None => std::fs::remove_file(&path),
        };
        match restored {
            Ok(()) => tracing::debug!("rolled back {}", path.display()),
            Err(e) => tracing::warn!("could not roll back {}: {}", path.display(), e),
        }
    }
}
