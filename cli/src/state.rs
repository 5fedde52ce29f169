//! Process-wide state for the CLI.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use soilscan::config::load_config;
use soilscan::{
    AnalysisSession, ApiClient, BroadcastNotifier, ProcessingCoordinator, ProcessingRegistry,
    ProgressPresenter, SoilscanConfig, UploadCoordinator,
};

/// Everything shared by the sessions of one process.
pub struct AppState {
    pub config: SoilscanConfig,

    /// File the config was read from; `None` when running on defaults.
    pub config_path: Option<PathBuf>,

    /// Outcome cache for every batch processed by this process.
    pub registry: Arc<ProcessingRegistry>,

    /// Failure notices raised by the coordinators.
    pub notifier: BroadcastNotifier,

    processing: ProcessingCoordinator,
    client: Arc<ApiClient>,
}

impl AppState {
    /// Loads the config and builds the shared state.
    ///
    /// An explicit path must exist; the default path is optional.
    pub fn load(config_path: Option<&Path>) -> soilscan::Result<Self> {
        let (mut config, source) = match config_path {
            Some(path) => (load_config(path)?, Some(path.to_path_buf())),
            None => match default_config_path() {
                Some(path) if path.exists() => (load_config(&path)?, Some(path)),
                _ => (SoilscanConfig::default(), None),
            },
        };
        config.apply_env_overrides();

        let mut state = Self::from_config(config)?;
        state.config_path = source;
        Ok(state)
    }

    pub fn from_config(config: SoilscanConfig) -> soilscan::Result<Self> {
        let client = Arc::new(ApiClient::new(&config.api)?);
        let registry = Arc::new(ProcessingRegistry::new());
        let notifier = BroadcastNotifier::default();
        let processing = ProcessingCoordinator::new(
            Arc::clone(&registry),
            client.clone(),
            Arc::new(notifier.clone()),
        )
        .with_timeout(config.api.processing_timeout());

        Ok(Self {
            config,
            config_path: None,
            registry,
            notifier,
            processing,
            client,
        })
    }

    pub fn processing(&self) -> &ProcessingCoordinator {
        &self.processing
    }

    pub fn uploads(&self) -> UploadCoordinator {
        UploadCoordinator::new(self.client.clone(), Arc::new(self.notifier.clone()))
            .with_max_files(self.config.upload.max_files)
    }

    pub fn session(&self) -> AnalysisSession {
        AnalysisSession::new(
            self.uploads(),
            self.processing.clone(),
            ProgressPresenter::new(self.config.progress.clone()),
        )
        .with_upload_settle_delay(self.config.upload.settle_delay())
    }
}

/// `<config dir>/soilscan/config.json`, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("soilscan").join("config.json"))
}
