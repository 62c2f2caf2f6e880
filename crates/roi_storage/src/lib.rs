#![forbid(unsafe_code)]

pub mod azure_blob;
pub mod blob;
pub mod connection_string;
pub mod history;

pub use blob::{BlobStore, LocalFsBlobStore, MemoryBlobStore, StorageError, UnconfiguredBlobStore};
pub use history::{HistoryStore, HISTORY_BLOB_NAME, HISTORY_CONTAINER_NAME};
