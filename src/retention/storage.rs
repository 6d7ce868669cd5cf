//! Audio artifact storage.
//!
//! Artifacts are flat files in one directory, named by the upload handler and
//! referenced from notes by that name. Names never contain path separators.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs;
use uuid::Uuid;

use crate::domain::StoredAudioFile;

/// Errors that can occur with audio storage
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Audio file not found: {0}")]
    NotFound(String),

    #[error("Invalid audio file name: {0:?}")]
    InvalidName(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage task failed: {0}")]
    Task(String),
}

/// The listing/deleting capability the retention sweeper needs
#[async_trait]
pub trait AudioStorage: Send + Sync {
    /// Human-readable location (for logs)
    fn location(&self) -> String;

    /// All stored artifacts, or `None` when the storage directory does not
    /// exist yet
    async fn list_entries(&self) -> Result<Option<Vec<StoredAudioFile>>, StorageError>;

    /// Remove one artifact
    async fn delete_entry(&self, name: &str) -> Result<(), StorageError>;
}

/// Audio files in a local directory
#[derive(Debug, Clone)]
pub struct LocalAudioStorage {
    root: PathBuf,
}

impl LocalAudioStorage {
    /// Storage rooted at `root`. The directory is created on first write.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// The storage directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Generate a fresh artifact name, keeping the extension of the name the
    /// client supplied (if it looks like one).
    pub fn generate_name(original: Option<&str>) -> String {
        let extension = original
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(|ext| ext.to_ascii_lowercase());

        match extension {
            Some(ext) => format!("{}.{}", Uuid::new_v4(), ext),
            None => Uuid::new_v4().to_string(),
        }
    }

    /// Resolve `name` inside the storage directory, rejecting anything that
    /// could escape it.
    pub fn path_for(&self, name: &str) -> Result<PathBuf, StorageError> {
        let valid = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\\', '\0']);
        if !valid {
            return Err(StorageError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(name))
    }

    /// Persist `bytes` under `name`. The file appears under its final name
    /// only once fully written.
    pub async fn write(&self, name: &str, bytes: &[u8]) -> Result<StoredAudioFile, StorageError> {
        let path = self.path_for(name)?;
        fs::create_dir_all(&self.root).await?;

        let root = self.root.clone();
        let bytes = bytes.to_vec();
        let target = path.clone();
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let mut tmp = tempfile::Builder::new()
                .prefix(".upload-")
                .tempfile_in(&root)?;
            tmp.write_all(&bytes)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&target).map_err(|e| StorageError::Io(e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| StorageError::Task(e.to_string()))??;

        let metadata = fs::metadata(&path).await?;
        Ok(StoredAudioFile {
            name: name.to_string(),
            size_bytes: metadata.len(),
            modified: metadata.modified()?,
        })
    }

    /// Read a whole artifact
    pub async fn read(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(name)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl AudioStorage for LocalAudioStorage {
    fn location(&self) -> String {
        self.root.display().to_string()
    }

    async fn list_entries(&self) -> Result<Option<Vec<StoredAudioFile>>, StorageError> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            // The entry may disappear between listing and stat
            let metadata = match entry.metadata().await {
                Ok(m) => m,
                Err(_) => continue,
            };

            if !metadata.is_file() {
                continue;
            }

            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                tracing::warn!("Skipping non UTF-8 file name in {}", self.root.display());
                continue;
            };

            files.push(StoredAudioFile {
                name,
                size_bytes: metadata.len(),
                modified: metadata.modified()?,
            });
        }

        Ok(Some(files))
    }

    async fn delete_entry(&self, name: &str) -> Result<(), StorageError> {
        let path = self.path_for(name)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
