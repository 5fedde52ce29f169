//! Uploads a batch of scans, processes it and prints the prediction.

use std::path::PathBuf;

use log::warn;
use serde::Serialize;
use soilscan::{
    check_selection, AnalysisSession, FileBlob, FileDescriptor, Notice, ProcessingOutcome,
    ProcessingResult,
};

use super::CommandResponse;
use crate::events::EventBridge;
use crate::state::AppState;

pub struct AnalyzeOptions {
    pub files: Vec<PathBuf>,
    /// Print a JSON response instead of text.
    pub json: bool,
    /// Submit even if the selection fails the format or size checks.
    pub force: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub batch_id: String,
    pub files: Vec<FileDescriptor>,
    pub carbon_percentage: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_files_used: Option<u32>,
}

impl AnalysisReport {
    fn new(batch_id: String, files: Vec<FileDescriptor>, result: &ProcessingResult) -> Self {
        Self {
            batch_id,
            files,
            carbon_percentage: result.carbon_percentage,
            num_files_used: result.num_files_used,
        }
    }

    fn summary(&self) -> String {
        let scans = if self.files.len() == 1 {
            self.files[0].file_name.clone()
        } else {
            format!("{} files", self.files.len())
        };
        format!(
            "Soil carbon: {:.2}% ({} analyzed, batch {})",
            self.carbon_percentage, scans, self.batch_id
        )
    }
}

/// Why an analysis produced no report.
#[derive(Debug)]
struct AnalyzeFailure {
    message: String,
    /// Notices raised for the failure while the analysis ran.
    notices: Vec<Notice>,
}

impl AnalyzeFailure {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            notices: Vec::new(),
        }
    }

    /// Lines for stderr. A failure that raised notices is reported through
    /// them alone.
    fn lines(&self) -> Vec<String> {
        if self.notices.is_empty() {
            return vec![format!("Error: {}", self.message)];
        }
        self.notices
            .iter()
            .map(|notice| format!("{}: {}", notice.title, notice.description))
            .collect()
    }
}

/// Runs the analysis and prints the outcome. Returns whether it succeeded.
pub async fn analyze(state: &AppState, options: &AnalyzeOptions) -> bool {
    match run(state, options).await {
        Ok(report) => {
            if options.json {
                CommandResponse::ok(&report).print();
            } else {
                println!("{}", report.summary());
            }
            true
        }
        Err(failure) => {
            if options.json {
                CommandResponse::<()>::err(failure.message).print();
            } else {
                for line in failure.lines() {
                    eprintln!("{}", line);
                }
            }
            false
        }
    }
}

async fn run(state: &AppState, options: &AnalyzeOptions) -> Result<AnalysisReport, AnalyzeFailure> {
    let mut files = Vec::with_capacity(options.files.len());
    for path in &options.files {
        let blob = FileBlob::from_path(path)
            .await
            .map_err(|e| AnalyzeFailure::new(e.to_string()))?;
        files.push(blob);
    }

    let issues = check_selection(&files, &state.config.upload);
    if !issues.is_empty() {
        for issue in &issues {
            warn!("{}", issue);
        }
        if !options.force {
            let details: Vec<String> = issues.iter().map(|i| i.to_string()).collect();
            return Err(AnalyzeFailure::new(format!(
                "Invalid selection: {}",
                details.join("; ")
            )));
        }
    }

    let mut bridge = EventBridge::start(state);
    let mut session = state.session();

    let result = submit_and_wait(&mut session, &mut bridge, &files, options.json).await;
    let notices = bridge.take_notices();
    drop(bridge);

    let (descriptors, outcome) = match result {
        Ok(done) => done,
        Err(message) => return Err(AnalyzeFailure { message, notices }),
    };
    match outcome {
        ProcessingOutcome::Success(result) => Ok(AnalysisReport::new(
            session.batch_id().to_string(),
            descriptors,
            &result,
        )),
        ProcessingOutcome::Failure(message) => Err(AnalyzeFailure { message, notices }),
        ProcessingOutcome::Pending => Err(AnalyzeFailure::new("Processing did not finish")),
    }
}

async fn submit_and_wait(
    session: &mut AnalysisSession,
    bridge: &mut EventBridge,
    files: &[FileBlob],
    json: bool,
) -> Result<(Vec<FileDescriptor>, ProcessingOutcome), String> {
    let descriptors = session.submit(files).await.map_err(|e| e.to_string())?;
    if !json {
        if let Some(progress) = session.subscribe_progress() {
            bridge.show_progress(progress);
        }
    }

    let outcome = session.await_results().await.map_err(|e| e.to_string())?;
    Ok((descriptors, outcome))
}
