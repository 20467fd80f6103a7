use std::io::Write;
use std::path::{Component, Path, PathBuf};

use super::ObjectStore;
use crate::error::StorageError;

/// Object store over a local directory. References are relative paths
/// below the root; anything that would escape it is rejected.
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a reference to its path below the root.
    pub fn resolve(&self, file_ref: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(file_ref);
        if file_ref.trim().is_empty() {
            return Err(StorageError::InvalidReference(file_ref.to_string()));
        }

        let mut resolved = self.root.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(StorageError::InvalidReference(file_ref.to_string()));
                }
            }
        }

        if resolved == self.root {
            return Err(StorageError::InvalidReference(file_ref.to_string()));
        }
        Ok(resolved)
    }

    fn ensure_directory(&self, path: &Path) -> Result<(), StorageError> {
        if !path.exists() {
            std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
        Ok(())
    }
}

impl ObjectStore for LocalObjectStore {
    fn fetch(&self, file_ref: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(file_ref)?;
        std::fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(file_ref.to_string())
            } else {
                StorageError::ReadFile { path, source: e }
            }
        })
    }

    /// Writes through a temp file in the target directory and renames it
    /// into place, so readers never observe a partial object.
    fn put(&self, file_ref: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.resolve(file_ref)?;
        let dir = path
            .parent()
            .ok_or_else(|| StorageError::InvalidReference(file_ref.to_string()))?;
        self.ensure_directory(dir)?;

        let write_err = |e: std::io::Error| StorageError::WriteFile {
            path: path.clone(),
            source: e,
        };

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
        tmp.write_all(bytes).map_err(write_err)?;
        tmp.persist(&path).map_err(|e| write_err(e.error))?;

        log::debug!(
            "Stored object {} ({} bytes)",
            crate::sanitize::redact_ref(file_ref),
            bytes.len()
        );
        Ok(())
    }

    fn remove(&self, file_ref: &str) -> Result<(), StorageError> {
        let path = self.resolve(file_ref)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::RemoveFile { path, source: e }),
        }
    }
}
