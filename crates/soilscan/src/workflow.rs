//! Three-step workflow: upload, processing, results.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::WorkflowError;

/// A step of the analysis workflow, numbered from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    Upload,
    Processing,
    Results,
}

impl WorkflowStep {
    pub const ALL: [WorkflowStep; 3] = [
        WorkflowStep::Upload,
        WorkflowStep::Processing,
        WorkflowStep::Results,
    ];

    pub fn number(self) -> usize {
        match self {
            WorkflowStep::Upload => 1,
            WorkflowStep::Processing => 2,
            WorkflowStep::Results => 3,
        }
    }

    pub fn from_number(step: usize) -> Result<Self, WorkflowError> {
        match step {
            1 => Ok(WorkflowStep::Upload),
            2 => Ok(WorkflowStep::Processing),
            3 => Ok(WorkflowStep::Results),
            _ => Err(WorkflowError::InvalidStep {
                step,
                max: Self::ALL.len(),
            }),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            WorkflowStep::Upload => "Upload Data",
            WorkflowStep::Processing => "Processing",
            WorkflowStep::Results => "Results",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            WorkflowStep::Upload => "Upload your NIR spectral data file",
            WorkflowStep::Processing => "System is analyzing your spectral data",
            WorkflowStep::Results => "View your soil carbon analysis results",
        }
    }

    pub fn next(self) -> Option<Self> {
        Self::from_number(self.number() + 1).ok()
    }

    pub fn previous(self) -> Option<Self> {
        Self::from_number(self.number() - 1).ok()
    }
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Complete,
    Current,
    Upcoming,
}

/// Display data for one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub status: StepStatus,
}

/// Tracks the current step and publishes changes.
///
/// Moving to the step that is already current publishes nothing.
pub struct WorkflowController {
    current: watch::Sender<WorkflowStep>,
}

impl WorkflowController {
    pub fn new() -> Self {
        Self::starting_at(WorkflowStep::Upload)
    }

    pub fn starting_at(step: WorkflowStep) -> Self {
        let (current, _) = watch::channel(step);
        Self { current }
    }

    pub fn current(&self) -> WorkflowStep {
        *self.current.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkflowStep> {
        self.current.subscribe()
    }

    /// Moves to step `step` (1-based). Returns whether the step changed.
    pub fn go_to_step(&self, step: usize) -> Result<bool, WorkflowError> {
        let step = WorkflowStep::from_number(step)?;
        Ok(self.enter(step))
    }

    /// Moves to `step`. Returns whether the step changed.
    pub fn enter(&self, step: WorkflowStep) -> bool {
        let changed = self.current.send_if_modified(|current| {
            if *current == step {
                return false;
            }
            *current = step;
            true
        });
        if changed {
            log::debug!("Workflow moved to step {} ({})", step.number(), step);
        }
        changed
    }

    /// Advances one step; no-op on the last step.
    pub fn next_step(&self) -> bool {
        match self.current().next() {
            Some(step) => self.enter(step),
            None => false,
        }
    }

    /// Goes back one step; no-op on the first step.
    pub fn previous_step(&self) -> bool {
        match self.current().previous() {
            Some(step) => self.enter(step),
            None => false,
        }
    }

    pub fn reset(&self) -> bool {
        self.enter(WorkflowStep::Upload)
    }

    pub fn steps(&self) -> Vec<StepInfo> {
        let current = self.current();
        WorkflowStep::ALL
            .iter()
            .map(|&step| StepInfo {
                id: format!("Step {}", step.number()),
                name: step.name().to_string(),
                description: step.description().to_string(),
                status: if step < current {
                    StepStatus::Complete
                } else if step == current {
                    StepStatus::Current
                } else {
                    StepStatus::Upcoming
                },
            })
            .collect()
    }
}

impl Default for WorkflowController {
    fn default() -> Self {
        Self::new()
    }
}
