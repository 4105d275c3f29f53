//! Persistent state
//!
//! Two places hold records: the device's own save region (behind
//! [`RecordArchive`]) and the SD working directory ([`Workspace`]) with the
//! merged snapshot, backups, sync counter and title names.

pub mod workspace;

pub use workspace::{DeviceState, Workspace};

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::backup::BackupError;
use crate::merge::MergeError;
use crate::record::RecordError;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    #[error("Merge error: {0}")]
    Merge(#[from] MergeError),

    #[error("Backup error: {0}")]
    Backup(#[from] BackupError),

    #[error("Save region not found: {0}")]
    ArchiveMissing(String),
}

/// The device's primary save region: one full record store.
#[async_trait]
pub trait RecordArchive: Send + Sync {
    /// Read the whole region.
    async fn read(&self) -> Result<Vec<u8>, StorageError>;

    /// Replace the whole region.
    async fn write(&self, bytes: &[u8]) -> Result<(), StorageError>;

    /// Human-readable location for logs and CLI output.
    fn describe(&self) -> String;
}

/// Save region backed by a plain file.
pub struct FileArchive {
    path: PathBuf,
}

impl FileArchive {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RecordArchive for FileArchive {
    async fn read(&self) -> Result<Vec<u8>, StorageError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::ArchiveMissing(self.describe()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, bytes: &[u8]) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&self.path, bytes).await?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-memory save region.
#[derive(Default)]
pub struct MemoryArchive {
    bytes: Mutex<Vec<u8>>,
}

impl MemoryArchive {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Mutex::new(bytes),
        }
    }

    pub async fn snapshot(&self) -> Vec<u8> {
        self.bytes.lock().await.clone()
    }
}

#[async_trait]
impl RecordArchive for MemoryArchive {
    async fn read(&self) -> Result<Vec<u8>, StorageError> {
        Ok(self.bytes.lock().await.clone())
    }

    async fn write(&self, bytes: &[u8]) -> Result<(), StorageError> {
        *self.bytes.lock().await = bytes.to_vec();
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
