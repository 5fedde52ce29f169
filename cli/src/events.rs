//! Event bridge between the soilscan library and the terminal.

use std::io::Write;

use log::{debug, info, warn};
use soilscan::processing::ProcessingStatus;
use soilscan::Notice;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::state::AppState;

/// Logs processing events and renders progress while alive, and collects
/// the notices raised meanwhile.
pub struct EventBridge {
    notices: broadcast::Receiver<Notice>,
    tasks: Vec<JoinHandle<()>>,
}

impl EventBridge {
    pub fn start(state: &AppState) -> Self {
        info!("Starting event bridge");

        let notices = state.notifier.subscribe();
        let mut events = state.processing().subscribe();
        let event_task = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => match event.status {
                        ProcessingStatus::Started => debug!("Batch {} started", event.batch_id),
                        ProcessingStatus::Succeeded => debug!(
                            "Batch {} succeeded ({:?}%)",
                            event.batch_id, event.carbon_percentage
                        ),
                        ProcessingStatus::Failed => debug!(
                            "Batch {} failed: {}",
                            event.batch_id,
                            event.error.unwrap_or_default()
                        ),
                        ProcessingStatus::Reset => debug!("Batch {} reset", event.batch_id),
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Event listener lagged, skipped {} events", skipped)
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        Self {
            notices,
            tasks: vec![event_task],
        }
    }

    /// Notices raised since the bridge started or since the last call.
    pub fn take_notices(&mut self) -> Vec<Notice> {
        let mut taken = Vec::new();
        loop {
            match self.notices.try_recv() {
                Ok(notice) => taken.push(notice),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!("Notice listener lagged, skipped {} notices", skipped)
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        taken
    }

    /// Renders a progress bar line until the animation stops.
    pub fn show_progress(&mut self, mut progress: watch::Receiver<f64>) {
        self.tasks.push(tokio::spawn(async move {
            while progress.changed().await.is_ok() {
                let value = *progress.borrow_and_update();
                eprint!("\r{} {:>3.0}%", bar(value), value);
                let _ = std::io::stderr().flush();
                if value >= 100.0 {
                    break;
                }
            }
            eprintln!();
        }));
    }
}

impl Drop for EventBridge {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

fn bar(value: f64) -> String {
    const WIDTH: usize = 30;
    let filled = ((value.clamp(0.0, 100.0) / 100.0) * WIDTH as f64).round() as usize;
    format!("[{}{}]", "#".repeat(filled), "-".repeat(WIDTH - filled))
}
