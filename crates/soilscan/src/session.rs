//! One user's pass through the upload, processing and results steps.

use std::time::Duration;

use log::{info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::batch::{new_batch_id, BatchId, FileBlob, FileDescriptor};
use crate::error::{Result, WorkflowError};
use crate::processing::{ProcessingCoordinator, ProcessingOutcome};
use crate::progress::{Completion, ProgressHandle, ProgressPresenter};
use crate::upload::UploadCoordinator;
use crate::workflow::{StepInfo, WorkflowController, WorkflowStep};

const DEFAULT_UPLOAD_SETTLE_DELAY: Duration = Duration::from_millis(750);

/// Drives a batch through the workflow.
///
/// Owns the batch id for the current pass. Processing starts when the
/// session enters the processing step and runs independently of the
/// session; the results step reads the outcome from the registry. The
/// session's own wait on that request, and with it the failure notice, ends
/// when the session is reset or dropped.
pub struct AnalysisSession {
    uploads: UploadCoordinator,
    processing: ProcessingCoordinator,
    presenter: ProgressPresenter,
    workflow: WorkflowController,
    upload_settle_delay: Duration,
    batch_id: BatchId,
    files: Vec<FileDescriptor>,
    progress: Option<ProgressHandle>,
    processing_task: Option<JoinHandle<()>>,
}

impl AnalysisSession {
    pub fn new(
        uploads: UploadCoordinator,
        processing: ProcessingCoordinator,
        presenter: ProgressPresenter,
    ) -> Self {
        Self {
            uploads,
            processing,
            presenter,
            workflow: WorkflowController::new(),
            upload_settle_delay: DEFAULT_UPLOAD_SETTLE_DELAY,
            batch_id: new_batch_id(),
            files: Vec::new(),
            progress: None,
            processing_task: None,
        }
    }

    /// Pause between a successful upload and the processing step.
    pub fn with_upload_settle_delay(mut self, delay: Duration) -> Self {
        self.upload_settle_delay = delay;
        self
    }

    pub fn batch_id(&self) -> &BatchId {
        &self.batch_id
    }

    /// Descriptors of the last successful upload.
    pub fn files(&self) -> &[FileDescriptor] {
        &self.files
    }

    pub fn current_step(&self) -> WorkflowStep {
        self.workflow.current()
    }

    pub fn steps(&self) -> Vec<StepInfo> {
        self.workflow.steps()
    }

    pub fn subscribe_steps(&self) -> watch::Receiver<WorkflowStep> {
        self.workflow.subscribe()
    }

    /// Progress of the running animation, if the session is processing.
    pub fn subscribe_progress(&self) -> Option<watch::Receiver<f64>> {
        self.progress.as_ref().map(|handle| handle.subscribe())
    }

    /// Uploads `files` under the session's batch id, then enters the
    /// processing step.
    ///
    /// On failure the session stays on the upload step and nothing is
    /// kept from the attempt.
    pub async fn submit(&mut self, files: &[FileBlob]) -> Result<Vec<FileDescriptor>> {
        self.expect_step(WorkflowStep::Upload)?;

        let descriptors = self.uploads.upload(files, &self.batch_id).await?;
        self.files = descriptors.clone();

        tokio::time::sleep(self.upload_settle_delay).await;
        self.enter_processing();
        Ok(descriptors)
    }

    fn enter_processing(&mut self) {
        if !self.workflow.enter(WorkflowStep::Processing) {
            return;
        }

        info!("Starting processing for batch {}", self.batch_id);
        let processing = self.processing.clone();
        let batch_id = self.batch_id.clone();
        self.processing_task = Some(tokio::spawn(async move {
            processing.process(&batch_id).await;
        }));

        self.progress = Some(
            self.presenter
                .start(self.batch_id.clone(), self.processing.registry().clone()),
        );
    }

    /// Waits for the progress animation to finish, moves to the results
    /// step and returns the batch's outcome.
    ///
    /// The outcome is normally cached by then. If the animation finished
    /// first, this waits for the running request. Any failure notice for the
    /// request has been raised by the time this returns.
    pub async fn await_results(&mut self) -> Result<ProcessingOutcome> {
        self.expect_step(WorkflowStep::Processing)?;

        let completion = match self.progress.as_mut() {
            Some(handle) => handle.wait_complete().await,
            None => None,
        };
        self.progress = None;
        if completion == Some(Completion::Animated) {
            info!("Progress finished before batch {} settled", self.batch_id);
        }

        self.workflow.enter(WorkflowStep::Results);
        if let Some(task) = self.processing_task.take() {
            if let Err(e) = task.await {
                warn!("Processing wait for batch {} ended abnormally: {}", self.batch_id, e);
            }
        }
        let outcome = self.processing.process_or_join(&self.batch_id).await;
        Ok(outcome.unwrap_or(ProcessingOutcome::Pending))
    }

    /// Cached outcome of the current batch, without any request.
    pub fn results(&self) -> Option<ProcessingOutcome> {
        self.processing.outcome(&self.batch_id)
    }

    /// Drops the current batch and returns to the upload step with a new
    /// batch id.
    pub fn reset_to_upload(&mut self) -> &BatchId {
        self.progress = None;
        self.stop_waiting();
        self.processing.reset(&self.batch_id);
        self.files.clear();
        self.batch_id = new_batch_id();
        self.workflow.reset();
        info!("Session reset, new batch {}", self.batch_id);
        &self.batch_id
    }

    fn stop_waiting(&mut self) {
        if let Some(task) = self.processing_task.take() {
            task.abort();
        }
    }

    fn expect_step(&self, expected: WorkflowStep) -> std::result::Result<(), WorkflowError> {
        let current = self.workflow.current();
        if current != expected {
            return Err(WorkflowError::WrongStep {
                current: current.number(),
                expected: expected.number(),
            });
        }
        Ok(())
    }
}

impl Drop for AnalysisSession {
    fn drop(&mut self) {
        self.stop_waiting();
    }
}
