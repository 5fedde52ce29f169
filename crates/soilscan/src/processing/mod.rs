//! Single-flight processing of uploaded batches.
//!
//! [`ProcessingRegistry`] holds the state of every batch that has been
//! processed in this process: in flight, or settled with a terminal
//! [`ProcessingOutcome`]. [`ProcessingCoordinator`] issues the remote call at
//! most once per batch and replays the cached outcome to every later caller.

pub mod coordinator;
pub mod registry;

use serde::{Deserialize, Serialize};

pub use coordinator::{ProcessAttempt, ProcessingCoordinator, ProcessingEvent, ProcessingStatus};
pub use registry::{AttemptTicket, Claim, ProcessingRegistry};

/// Result returned by the processing endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingResult {
    /// Predicted soil carbon content, in percent.
    pub carbon_percentage: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    /// Number of scans that contributed to the prediction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_files_used: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ProcessingResult {
    pub fn new(carbon_percentage: f64) -> Self {
        Self {
            carbon_percentage,
            batch_id: None,
            num_files_used: None,
            message: None,
        }
    }
}

/// State of one batch's processing.
///
/// `Pending` moves to `Success` or `Failure` exactly once; both are terminal
/// until the batch is reset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum ProcessingOutcome {
    Pending,
    Success(ProcessingResult),
    Failure(String),
}

impl ProcessingOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProcessingOutcome::Pending)
    }

    pub fn result(&self) -> Option<&ProcessingResult> {
        match self {
            ProcessingOutcome::Success(result) => Some(result),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ProcessingOutcome::Failure(message) => Some(message),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_deserializes_endpoint_body() {
        let body = r#"{
            "message": "Files processed successfully",
            "batchId": "b1",
            "numFilesUsed": 3,
            "carbonPercentage": 2.37
        }"#;
        let result: ProcessingResult = serde_json::from_str(body).unwrap();
        assert_eq!(result.carbon_percentage, 2.37);
        assert_eq!(result.num_files_used, Some(3));
        assert_eq!(result.batch_id.as_deref(), Some("b1"));

        let minimal: ProcessingResult = serde_json::from_str(r#"{"carbonPercentage":42.5}"#).unwrap();
        assert_eq!(minimal, ProcessingResult::new(42.5));
    }

    #[test]
    fn test_result_requires_carbon_percentage() {
        let result = serde_json::from_str::<ProcessingResult>(r#"{"message":"ok"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_outcome_accessors() {
        let success = ProcessingOutcome::Success(ProcessingResult::new(1.5));
        assert!(success.is_terminal());
        assert_eq!(success.result().map(|r| r.carbon_percentage), Some(1.5));
        assert_eq!(success.error(), None);

        let failure = ProcessingOutcome::Failure("model unavailable".to_string());
        assert!(failure.is_terminal());
        assert_eq!(failure.error(), Some("model unavailable"));

        assert!(!ProcessingOutcome::Pending.is_terminal());
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_value(ProcessingOutcome::Failure("boom".to_string())).unwrap();
        assert_eq!(json["status"], "failure");
        assert_eq!(json["data"], "boom");

        let json = serde_json::to_value(ProcessingOutcome::Pending).unwrap();
        assert_eq!(json["status"], "pending");
    }
}
