#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("blob '{container}/{blob}' not found")]
    NotFound { container: String, blob: String },
    #[error("stored history is malformed: {0}")]
    Malformed(String),
    #[error("storage io failure: {0}")]
    Io(String),
    #[error("storage transport failure: {0}")]
    Transport(String),
    #[error("storage request failed with status {status}: {detail}")]
    Http { status: u16, detail: String },
    #[error("storage is not configured: {0}")]
    Config(String),
}

/// Whole-object get/put over a container/blob namespace.
pub trait BlobStore: Send + Sync {
    fn get(&self, container: &str, blob: &str) -> Result<Vec<u8>, StorageError>;

    /// Replaces the blob's content unconditionally.
    fn put(
        &self,
        container: &str,
        blob: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), StorageError>;

    /// Human-readable backend label without secrets.
    fn describe(&self) -> String;
}

#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<BTreeMap<(String, String), Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds raw bytes, bypassing any encoding.
    pub fn insert_raw(&self, container: &str, blob: &str, bytes: &[u8]) {
        if let Ok(mut blobs) = self.blobs.lock() {
            blobs.insert((container.to_string(), blob.to_string()), bytes.to_vec());
        }
    }

    pub fn raw(&self, container: &str, blob: &str) -> Option<Vec<u8>> {
        self.blobs
            .lock()
            .ok()?
            .get(&(container.to_string(), blob.to_string()))
            .cloned()
    }
}

impl BlobStore for MemoryBlobStore {
    fn get(&self, container: &str, blob: &str) -> Result<Vec<u8>, StorageError> {
        let blobs = self
            .blobs
            .lock()
            .map_err(|_| StorageError::Io("memory blob store lock poisoned".to_string()))?;
        blobs
            .get(&(container.to_string(), blob.to_string()))
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                container: container.to_string(),
                blob: blob.to_string(),
            })
    }

    fn put(
        &self,
        container: &str,
        blob: &str,
        bytes: &[u8],
        _content_type: &str,
    ) -> Result<(), StorageError> {
        let mut blobs = self
            .blobs
            .lock()
            .map_err(|_| StorageError::Io("memory blob store lock poisoned".to_string()))?;
        blobs.insert((container.to_string(), blob.to_string()), bytes.to_vec());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// Stores each blob at `<root>/<container>/<blob>`.
#[derive(Debug, Clone)]
pub struct LocalFsBlobStore {
    root: PathBuf,
}

impl LocalFsBlobStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn blob_path(&self, container: &str, blob: &str) -> Result<PathBuf, StorageError> {
        for part in [container, blob] {
            let path = Path::new(part);
            if part.is_empty()
                || path.components().count() != 1
                || part == "."
                || part == ".."
                || path.is_absolute()
            {
                return Err(StorageError::Config(format!(
                    "invalid blob path component '{part}'"
                )));
            }
        }
        Ok(self.root.join(container).join(blob))
    }
}

impl BlobStore for LocalFsBlobStore {
    fn get(&self, container: &str, blob: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.blob_path(container, blob)?;
        fs::read(&path).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound {
                    container: container.to_string(),
                    blob: blob.to_string(),
                }
            } else {
                StorageError::Io(format!("failed reading '{}': {}", path.display(), err))
            }
        })
    }

    fn put(
        &self,
        container: &str,
        blob: &str,
        bytes: &[u8],
        _content_type: &str,
    ) -> Result<(), StorageError> {
        let path = self.blob_path(container, blob)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                StorageError::Io(format!(
                    "failed to create blob directory '{}': {}",
                    parent.display(),
                    err
                ))
            })?;
        }
        // Write-then-rename so readers never observe a half-written array.
        let tmp_path = path.with_extension("tmp");
        let mut file = fs::File::create(&tmp_path).map_err(|err| {
            StorageError::Io(format!("failed creating '{}': {}", tmp_path.display(), err))
        })?;
        file.write_all(bytes)
            .and_then(|_| file.sync_data())
            .map_err(|err| {
                StorageError::Io(format!("failed writing '{}': {}", tmp_path.display(), err))
            })?;
        fs::rename(&tmp_path, &path).map_err(|err| {
            StorageError::Io(format!(
                "failed replacing '{}': {}",
                path.display(),
                err
            ))
        })
    }

    fn describe(&self) -> String {
        format!("local_fs:{}", self.root.display())
    }
}

/// Placeholder backend for a deployment whose storage settings are missing or
/// invalid. Every call fails with the captured reason.
#[derive(Debug, Clone)]
pub struct UnconfiguredBlobStore {
    reason: String,
}

impl UnconfiguredBlobStore {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl BlobStore for UnconfiguredBlobStore {
    fn get(&self, _container: &str, _blob: &str) -> Result<Vec<u8>, StorageError> {
        Err(StorageError::Config(self.reason.clone()))
    }

    fn put(
        &self,
        _container: &str,
        _blob: &str,
        _bytes: &[u8],
        _content_type: &str,
    ) -> Result<(), StorageError> {
        Err(StorageError::Config(self.reason.clone()))
    }

    fn describe(&self) -> String {
        "unconfigured".to_string()
    }
}
