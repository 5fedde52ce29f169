//! Remote endpoints the orchestration layer talks to.
//!
//! The coordinators only depend on the [`UploadEndpoint`] and
//! [`ProcessingEndpoint`] traits; [`ApiClient`] implements both over HTTP.

pub mod client;

use async_trait::async_trait;
use serde::Deserialize;

use crate::batch::BatchId;
use crate::error::ClientError;
use crate::processing::ProcessingResult;

pub use client::ApiClient;

/// One renamed file inside an upload request.
#[derive(Debug, Clone)]
pub struct UploadPart {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait UploadEndpoint: Send + Sync {
    /// Sends every part of a batch in a single request.
    async fn upload(&self, batch_id: &BatchId, parts: Vec<UploadPart>) -> Result<(), ClientError>;
}

#[async_trait]
pub trait ProcessingEndpoint: Send + Sync {
    /// Runs the remote prediction over every file uploaded under `batch_id`.
    async fn process(&self, batch_id: &BatchId) -> Result<ProcessingResult, ClientError>;
}

/// Error body returned by both endpoints on non-2xx responses.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
}
