//! HTTP implementation of the upload and processing endpoints.

use async_trait::async_trait;
use log::debug;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};

use super::{ErrorBody, ProcessingEndpoint, UploadEndpoint, UploadPart};
use crate::batch::BatchId;
use crate::config::ApiConfig;
use crate::error::ClientError;
use crate::processing::ProcessingResult;

/// Maximum length of a raw error body quoted in a transport error.
const MAX_ERROR_BODY_LENGTH: usize = 200;

/// Client for the upload and processing endpoints of one deployment.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    upload_url: String,
    process_url: String,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self, ClientError> {
        // No request timeout here; ProcessingCoordinator applies its own.
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| {
                ClientError::transport(&config.base_url, format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: Client, config: &ApiConfig) -> Self {
        Self {
            client,
            upload_url: join_url(&config.base_url, &config.upload_path),
            process_url: join_url(&config.base_url, &config.process_path),
        }
    }

    pub fn upload_url(&self) -> &str {
        &self.upload_url
    }

    pub fn process_url(&self) -> &str {
        &self.process_url
    }
}

#[async_trait]
impl UploadEndpoint for ApiClient {
    async fn upload(&self, batch_id: &BatchId, parts: Vec<UploadPart>) -> Result<(), ClientError> {
        let mut form = Form::new().text("batchId", batch_id.to_string());
        for upload in parts {
            let part = Part::bytes(upload.bytes).file_name(upload.file_name.clone());
            let part = match part.mime_str(&upload.content_type) {
                Ok(part) => part,
                Err(e) => {
                    return Err(ClientError::transport(
                        &self.upload_url,
                        format!("Invalid content type for {}: {}", upload.file_name, e),
                    ))
                }
            };
            form = form.part("files", part);
        }

        debug!("POST {} (batch {})", self.upload_url, batch_id);
        let response = self
            .client
            .post(&self.upload_url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ClientError::transport(&self.upload_url, e.to_string()))?;

        if !response.status().is_success() {
            return Err(error_from_response(&self.upload_url, response, "Upload failed").await);
        }

        Ok(())
    }
}

#[async_trait]
impl ProcessingEndpoint for ApiClient {
    async fn process(&self, batch_id: &BatchId) -> Result<ProcessingResult, ClientError> {
        debug!("GET {}?batchId={}", self.process_url, batch_id);
        let response = self
            .client
            .get(&self.process_url)
            .query(&[("batchId", batch_id.as_str())])
            .send()
            .await
            .map_err(|e| ClientError::transport(&self.process_url, e.to_string()))?;

        if !response.status().is_success() {
            return Err(error_from_response(&self.process_url, response, "Processing failed").await);
        }

        let body = response
            .text()
            .await
            .map_err(|e| ClientError::transport(&self.process_url, e.to_string()))?;

        serde_json::from_str(&body).map_err(|e| ClientError::InvalidResponse {
            endpoint: self.process_url.clone(),
            reason: e.to_string(),
        })
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

async fn error_from_response(endpoint: &str, response: Response, fallback: &str) -> ClientError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    classify_error_body(endpoint, status, &body, fallback)
}

/// Maps a non-2xx body to a remote error when it carries a message, otherwise
/// to a transport error with a best-effort message.
fn classify_error_body(endpoint: &str, status: u16, body: &str, fallback: &str) -> ClientError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .filter(|m| !m.trim().is_empty());

    match message {
        Some(message) => ClientError::Remote { status, message },
        None => {
            let excerpt = body.trim();
            let message = if excerpt.is_empty() || excerpt.starts_with('{') {
                format!("{} (HTTP {})", fallback, status)
            } else {
                let excerpt: String = excerpt.chars().take(MAX_ERROR_BODY_LENGTH).collect();
                format!("{} (HTTP {}): {}", fallback, status, excerpt)
            };
            ClientError::transport(endpoint, message)
        }
    }
}
