#![forbid(unsafe_code)]

use std::sync::{Arc, Mutex};

use roi_kernel_contracts::roi::RoiRecord;
use serde_json::Value;

use crate::{BlobStore, StorageError};

pub const HISTORY_CONTAINER_NAME: &str = "roivolutionblobcnt";
pub const HISTORY_BLOB_NAME: &str = "roi_data.json";

/// The ROI history: one JSON array in one blob.
///
/// `load` fails on anything but a readable JSON array. `append` is a
/// read-modify-write that starts from an empty history when the read fails
/// and overwrites the blob with the full array. Appends issued through the
/// same `HistoryStore` are serialized; writers in other processes still race
/// (last writer wins).
pub struct HistoryStore {
    blobs: Arc<dyn BlobStore>,
    container: String,
    blob: String,
    append_lock: Mutex<()>,
}

impl HistoryStore {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self::with_location(blobs, HISTORY_CONTAINER_NAME, HISTORY_BLOB_NAME)
    }

    pub fn with_location(
        blobs: Arc<dyn BlobStore>,
        container: impl Into<String>,
        blob: impl Into<String>,
    ) -> Self {
        Self {
            blobs,
            container: container.into(),
            blob: blob.into(),
            append_lock: Mutex::new(()),
        }
    }

    pub fn describe(&self) -> String {
        format!("{} {}/{}", self.blobs.describe(), self.container, self.blob)
    }

    pub fn load(&self) -> Result<Vec<Value>, StorageError> {
        let bytes = self.blobs.get(&self.container, &self.blob)?;
        decode_history(&bytes)
    }

    /// Read used by the append path: every failure reads as an empty history.
    pub fn load_or_empty(&self) -> Vec<Value> {
        match self.load() {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(
                    container = %self.container,
                    blob = %self.blob,
                    error = %err,
                    "history unreadable, starting from empty"
                );
                Vec::new()
            }
        }
    }

    /// Appends one record and returns the new history length.
    pub fn append(&self, record: &RoiRecord) -> Result<usize, StorageError> {
        let entry = serde_json::to_value(record)
            .map_err(|err| StorageError::Malformed(format!("failed to encode record: {err}")))?;
        let _guard = self
            .append_lock
            .lock()
            .map_err(|_| StorageError::Io("history append lock poisoned".to_string()))?;
        let mut entries = self.load_or_empty();
        entries.push(entry);
        let bytes = serde_json::to_vec(&entries)
            .map_err(|err| StorageError::Malformed(format!("failed to encode history: {err}")))?;
        self.blobs
            .put(&self.container, &self.blob, &bytes, "application/json")?;
        Ok(entries.len())
    }
}

fn decode_history(bytes: &[u8]) -> Result<Vec<Value>, StorageError> {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Array(entries)) => Ok(entries),
        Ok(other) => Err(StorageError::Malformed(format!(
            "expected a JSON array, found {}",
            json_kind(&other)
        ))),
        Err(err) => Err(StorageError::Malformed(err.to_string())),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
