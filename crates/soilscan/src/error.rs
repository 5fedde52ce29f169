use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SoilscanError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    #[error("Endpoint error: {0}")]
    Client(#[from] ClientError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Failed to read input file '{path}': {source}")]
    ReadInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

/// Input rejected before any request is sent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("No files provided")]
    NoFiles,

    #[error("Maximum {max} files allowed, got {count}")]
    TooManyFiles { count: usize, max: usize },
}

/// Failures talking to the upload or processing endpoint.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Non-2xx response carrying a server-supplied message. Displayed verbatim.
    #[error("{message}")]
    Remote { status: u16, message: String },

    /// Network failure, or a non-2xx response without a usable message.
    #[error("{message}")]
    Transport { endpoint: String, message: String },

    /// 2xx response whose body could not be understood.
    #[error("Invalid response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },
}

impl ClientError {
    pub fn transport(endpoint: &str, message: impl Into<String>) -> Self {
        ClientError::Transport {
            endpoint: endpoint.to_string(),
            message: message.into(),
        }
    }

    /// HTTP status of the failed response, if one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Remote { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Client(#[from] ClientError),
}

impl UploadError {
    pub fn is_validation(&self) -> bool {
        matches!(self, UploadError::Validation(_))
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("Invalid workflow step {step}: expected 1..={max}")]
    InvalidStep { step: usize, max: usize },

    #[error("Session is in step {current}, expected {expected}")]
    WrongStep { current: usize, expected: usize },
}

pub type Result<T> = std::result::Result<T, SoilscanError>;
