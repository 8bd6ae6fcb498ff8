use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("storage directory missing or not writable: {0}")]
    StorageDir(String),
    #[error("storage file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Ensure the storage directory exists; create if missing.
pub fn ensure_storage_dir(dir: &Path) -> Result<(), PersistError> {
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|e| PersistError::StorageDir(e.to_string()))?;
        if !meta.is_dir() {
            return Err(PersistError::StorageDir("path is not a directory".into()));
        }
    } else {
        fs::create_dir_all(dir).map_err(|e| PersistError::StorageDir(e.to_string()))?;
    }
    Ok(())
}

/// Atomically replaces a file by writing a sibling temp file and renaming it over the target.
pub struct AtomicFileWriter {
    path: PathBuf,
}

impl AtomicFileWriter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, content: &str) -> Result<(), PersistError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        ensure_storage_dir(&dir)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;
        tmp.persist(&self.path).map_err(|e| PersistError::Io(e.error))?;
        Ok(())
    }

    /// Removes the file; a missing file is not an error.
    pub fn remove(&self) -> Result<(), PersistError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
