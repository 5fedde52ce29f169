//! Batch and file identities.
//!
//! A batch id is generated on the client before anything is sent and is the
//! only key that ties an upload to its processing outcome. File ids are a pure
//! function of the batch id and the file's position in the selection.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SoilscanError;

/// Extension used when the original file name has none.
pub const DEFAULT_EXTENSION: &str = "csv";

/// Opaque identifier of one upload session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(String);

impl BatchId {
    /// Generates a fresh, effectively unique batch id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BatchId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for BatchId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for BatchId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Returns a new batch id. Call once per upload session, before any request.
pub fn new_batch_id() -> BatchId {
    BatchId::generate()
}

/// Derives the id of the file at `index` within `batch_id`.
pub fn derive_file_id(batch_id: &BatchId, index: usize) -> String {
    format!("{}-{}", batch_id, index)
}

/// Derives the uploaded file name for `file_id`, keeping the original extension.
pub fn derive_file_name(file_id: &str, original_name: &str) -> String {
    let extension = original_name
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty())
        .unwrap_or(DEFAULT_EXTENSION);
    format!("{}.{}", file_id, extension)
}

/// Identity of one uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDescriptor {
    pub file_id: String,
    pub file_name: String,
}

impl FileDescriptor {
    /// Builds the descriptor for the file at `index` of a batch.
    pub fn for_file(batch_id: &BatchId, index: usize, original_name: &str) -> Self {
        let file_id = derive_file_id(batch_id, index);
        let file_name = derive_file_name(&file_id, original_name);
        Self { file_id, file_name }
    }
}

/// A local file held in memory, ready to be uploaded.
#[derive(Clone)]
pub struct FileBlob {
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl FileBlob {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let name = name.into();
        let content_type = mime_guess::from_path(&name)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Self {
            name,
            content_type,
            bytes: bytes.into(),
        }
    }

    /// Reads a file from disk.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, SoilscanError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| SoilscanError::ReadInput {
                path: path.to_path_buf(),
                source: e,
            })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| format!("upload.{}", DEFAULT_EXTENSION));
        Ok(Self::new(name, bytes))
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Lower-cased extension of the file name, if any.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.name)
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
    }
}

impl fmt::Debug for FileBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileBlob")
            .field("name", &self.name)
            .field("content_type", &self.content_type)
            .field("size", &self.bytes.len())
            .finish()
    }
}
