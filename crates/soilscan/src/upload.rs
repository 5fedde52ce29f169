//! Upload of a batch of files in one request.

use std::fmt;
use std::sync::Arc;

use log::{info, warn};
use tracing::Instrument;

use crate::api::{UploadEndpoint, UploadPart};
use crate::batch::{BatchId, FileBlob, FileDescriptor};
use crate::config::UploadConfig;
use crate::error::{UploadError, ValidationError};
use crate::notify::{Notice, NotificationSink};

/// Hard upper bound on files per batch.
pub const MAX_FILES_PER_BATCH: usize = 4;

/// Sends batches to the upload endpoint.
///
/// Every call is a separate upload; nothing is deduplicated and nothing is
/// retried.
pub struct UploadCoordinator {
    endpoint: Arc<dyn UploadEndpoint>,
    notifier: Arc<dyn NotificationSink>,
    max_files: usize,
}

impl UploadCoordinator {
    pub fn new(endpoint: Arc<dyn UploadEndpoint>, notifier: Arc<dyn NotificationSink>) -> Self {
        Self {
            endpoint,
            notifier,
            max_files: MAX_FILES_PER_BATCH,
        }
    }

    /// Lowers the per-batch limit. Values outside `1..=4` are clamped.
    pub fn with_max_files(mut self, max_files: usize) -> Self {
        self.max_files = max_files.clamp(1, MAX_FILES_PER_BATCH);
        self
    }

    pub fn max_files(&self) -> usize {
        self.max_files
    }

    pub fn validate(&self, files: &[FileBlob]) -> Result<(), ValidationError> {
        if files.is_empty() {
            return Err(ValidationError::NoFiles);
        }
        if files.len() > self.max_files {
            return Err(ValidationError::TooManyFiles {
                count: files.len(),
                max: self.max_files,
            });
        }
        Ok(())
    }

    /// Uploads `files` under `batch_id` and returns their descriptors in input order.
    pub async fn upload(
        &self,
        files: &[FileBlob],
        batch_id: &BatchId,
    ) -> Result<Vec<FileDescriptor>, UploadError> {
        self.validate(files)?;

        let mut descriptors = Vec::with_capacity(files.len());
        let mut parts = Vec::with_capacity(files.len());
        for (index, file) in files.iter().enumerate() {
            let descriptor = FileDescriptor::for_file(batch_id, index, &file.name);
            parts.push(UploadPart {
                file_name: descriptor.file_name.clone(),
                content_type: file.content_type.clone(),
                bytes: file.bytes.clone(),
            });
            descriptors.push(descriptor);
        }

        let span = tracing::info_span!("upload.batch", batch_id = %batch_id, files = files.len());

        match self.endpoint.upload(batch_id, parts).instrument(span).await {
            Ok(()) => {
                info!("Uploaded {} file(s) for batch {}", descriptors.len(), batch_id);
                Ok(descriptors)
            }
            Err(e) => {
                warn!("Upload for batch {} failed: {}", batch_id, e);
                self.notifier.notify(Notice::upload_failed(&e.to_string()));
                Err(UploadError::Client(e))
            }
        }
    }
}

/// Advisory problem with a file selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionIssue {
    UnsupportedType { name: String },
    TooLarge { name: String, size: u64, max: u64 },
}

impl fmt::Display for SelectionIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionIssue::UnsupportedType { name } => {
                write!(f, "{}: files must be in CSV format", name)
            }
            SelectionIssue::TooLarge { name, size, max } => write!(
                f,
                "{}: {:.2} MB exceeds the {:.0} MB limit",
                name,
                *size as f64 / 1024.0 / 1024.0,
                *max as f64 / 1024.0 / 1024.0
            ),
        }
    }
}

/// Checks the advisory format and size constraints of a selection.
///
/// These are not enforced by [`UploadCoordinator::upload`]; callers decide
/// whether to block submission on them.
pub fn check_selection(files: &[FileBlob], config: &UploadConfig) -> Vec<SelectionIssue> {
    let mut issues = Vec::new();
    for file in files {
        let allowed = file.extension().is_some_and(|ext| {
            config
                .allowed_extensions
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(&ext))
        });
        if !allowed {
            issues.push(SelectionIssue::UnsupportedType {
                name: file.name.clone(),
            });
        }
        let size = file.size() as u64;
        if size > config.max_file_bytes {
            issues.push(SelectionIssue::TooLarge {
                name: file.name.clone(),
                size,
                max: config.max_file_bytes,
            });
        }
    }
    issues
}
