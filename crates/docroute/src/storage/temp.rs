use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::StorageError;

/// A job's local working copy, named `job_{id}_{filename}` inside its own
/// temporary directory. The directory is removed when this value drops,
/// whichever way the pipeline exits.
pub struct TempDocument {
    dir: TempDir,
    path: PathBuf,
}

impl TempDocument {
    pub fn create(
        scratch_dir: Option<&Path>,
        job_id: &str,
        filename: &str,
        bytes: &[u8],
    ) -> Result<Self, StorageError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("docroute-job-");

        let dir = match scratch_dir {
            Some(parent) => {
                std::fs::create_dir_all(parent).map_err(|e| StorageError::CreateDirectory {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
                builder.tempdir_in(parent)
            }
            None => builder.tempdir(),
        }
        .map_err(|e| StorageError::CreateDirectory {
            path: scratch_dir
                .map(Path::to_path_buf)
                .unwrap_or_else(std::env::temp_dir),
            source: e,
        })?;

        let path = dir.path().join(local_name(job_id, filename));
        std::fs::write(&path, bytes).map_err(|e| StorageError::WriteFile {
            path: path.clone(),
            source: e,
        })?;

        tracing::debug!(file = %crate::sanitize::redact_path(&path), "Created local copy");
        Ok(Self { dir, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

/// Only the final component of the stored filename is used.
fn local_name(job_id: &str, filename: &str) -> String {
    let base = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or("document");
    format!("job_{}_{}", job_id, base)
}
