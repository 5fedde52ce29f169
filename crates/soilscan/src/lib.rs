pub mod api;
pub mod batch;
pub mod config;
pub mod error;
pub mod logging;
pub mod notify;
pub mod processing;
pub mod progress;
pub mod session;
pub mod upload;
pub mod workflow;

pub use api::{ApiClient, ProcessingEndpoint, UploadEndpoint};
pub use batch::{new_batch_id, BatchId, FileBlob, FileDescriptor};
pub use config::{load_config, load_config_or_default, SoilscanConfig};
pub use error::{ClientError, ConfigError, Result, SoilscanError, UploadError, ValidationError, WorkflowError};
pub use notify::{BroadcastNotifier, Notice, NotificationSink, NoopNotifier};
pub use processing::{
    ProcessAttempt, ProcessingCoordinator, ProcessingEvent, ProcessingOutcome, ProcessingRegistry,
    ProcessingResult,
};
pub use progress::{Completion, ProgressAnimation, ProgressHandle, ProgressPresenter};
pub use session::AnalysisSession;
pub use upload::{check_selection, SelectionIssue, UploadCoordinator};
pub use workflow::{StepInfo, StepStatus, WorkflowController, WorkflowStep};
