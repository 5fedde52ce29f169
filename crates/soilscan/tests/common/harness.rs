//! Test harness wiring sessions to scripted endpoints.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use soilscan::api::{ProcessingEndpoint, UploadEndpoint, UploadPart};
use soilscan::config::ProgressConfig;
use soilscan::{
    AnalysisSession, BatchId, BroadcastNotifier, ClientError, FileBlob, Notice, ProcessingCoordinator,
    ProcessingRegistry, ProcessingResult, ProgressPresenter, UploadCoordinator,
};

/// Scripted upload and processing endpoints that record every call.
///
/// Processing responses are consumed in order; once the script is empty
/// every call succeeds with 42.5%.
pub struct MockEndpoints {
    upload_calls: Mutex<Vec<(BatchId, Vec<String>)>>,
    process_calls: Mutex<Vec<BatchId>>,
    responses: Mutex<VecDeque<Result<ProcessingResult, ClientError>>>,
    process_delay: Duration,
    upload_failure: Option<ClientError>,
}

impl MockEndpoints {
    pub fn new() -> Self {
        Self {
            upload_calls: Mutex::new(Vec::new()),
            process_calls: Mutex::new(Vec::new()),
            responses: Mutex::new(VecDeque::new()),
            process_delay: Duration::ZERO,
            upload_failure: None,
        }
    }

    pub fn with_process_delay(mut self, millis: u64) -> Self {
        self.process_delay = Duration::from_millis(millis);
        self
    }

    pub fn respond_with(self, response: Result<ProcessingResult, ClientError>) -> Self {
        self.responses.lock().unwrap().push_back(response);
        self
    }

    pub fn failing_upload(mut self, error: ClientError) -> Self {
        self.upload_failure = Some(error);
        self
    }

    pub fn upload_count(&self) -> usize {
        self.upload_calls.lock().unwrap().len()
    }

    pub fn uploaded_names(&self) -> Vec<Vec<String>> {
        self.upload_calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, names)| names.clone())
            .collect()
    }

    pub fn process_count(&self) -> usize {
        self.process_calls.lock().unwrap().len()
    }

    pub fn processed_batches(&self) -> Vec<BatchId> {
        self.process_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl UploadEndpoint for MockEndpoints {
    async fn upload(&self, batch_id: &BatchId, parts: Vec<UploadPart>) -> Result<(), ClientError> {
        let names = parts.into_iter().map(|p| p.file_name).collect();
        self.upload_calls.lock().unwrap().push((batch_id.clone(), names));
        match &self.upload_failure {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ProcessingEndpoint for MockEndpoints {
    async fn process(&self, batch_id: &BatchId) -> Result<ProcessingResult, ClientError> {
        self.process_calls.lock().unwrap().push(batch_id.clone());
        let response = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ProcessingResult::new(42.5)));
        tokio::time::sleep(self.process_delay).await;
        response
    }
}

/// Shared registry, coordinator and notice capture for one test.
pub struct TestHarness {
    pub endpoints: Arc<MockEndpoints>,
    pub registry: Arc<ProcessingRegistry>,
    pub notifier: BroadcastNotifier,
    pub processing: ProcessingCoordinator,
    notices: broadcast::Receiver<Notice>,
}

impl TestHarness {
    pub fn new(endpoints: MockEndpoints) -> Self {
        let endpoints = Arc::new(endpoints);
        let registry = Arc::new(ProcessingRegistry::new());
        let notifier = BroadcastNotifier::default();
        let notices = notifier.subscribe();
        let processing = ProcessingCoordinator::new(
            Arc::clone(&registry),
            endpoints.clone(),
            Arc::new(notifier.clone()),
        );

        Self {
            endpoints,
            registry,
            notifier,
            processing,
            notices,
        }
    }

    pub fn uploads(&self) -> UploadCoordinator {
        UploadCoordinator::new(self.endpoints.clone(), Arc::new(self.notifier.clone()))
    }

    /// A new session sharing this harness's registry and endpoints.
    pub fn session(&self) -> AnalysisSession {
        AnalysisSession::new(
            self.uploads(),
            self.processing.clone(),
            ProgressPresenter::new(ProgressConfig::default()),
        )
    }

    /// Notices raised since the last call.
    pub fn drain_notices(&mut self) -> Vec<Notice> {
        let mut notices = Vec::new();
        while let Ok(notice) = self.notices.try_recv() {
            notices.push(notice);
        }
        notices
    }
}

pub fn csv(name: &str) -> FileBlob {
    FileBlob::new(name, b"Wavelength,Absorbance\n950,0.412\n960,0.418\n".to_vec())
}
