use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment variable that overrides `api.base_url`.
pub const API_URL_ENV: &str = "SOILSCAN_API_URL";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoilscanConfig {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub progress: ProgressConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Default for SoilscanConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            api: ApiConfig::default(),
            upload: UploadConfig::default(),
            progress: ProgressConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl SoilscanConfig {
    /// Applies overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                self.api.base_url = url.trim().to_string();
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_upload_path")]
    pub upload_path: String,
    #[serde(default = "default_process_path")]
    pub process_path: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// No timeout when absent: a hung processing call stays in flight until reset.
    #[serde(default)]
    pub processing_timeout_ms: Option<u64>,
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_upload_path() -> String {
    "/api/upload".to_string()
}

fn default_process_path() -> String {
    "/api/process".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            upload_path: default_upload_path(),
            process_path: default_process_path(),
            connect_timeout_ms: default_connect_timeout_ms(),
            processing_timeout_ms: None,
        }
    }
}

impl ApiConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn processing_timeout(&self) -> Option<Duration> {
        self.processing_timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_max_files")]
    pub max_files: usize,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
    /// Pause after a successful upload before entering processing.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
}

fn default_max_files() -> usize {
    4
}

fn default_max_file_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_allowed_extensions() -> Vec<String> {
    vec!["csv".to_string()]
}

fn default_settle_delay_ms() -> u64 {
    750
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_files: default_max_files(),
            max_file_bytes: default_max_file_bytes(),
            allowed_extensions: default_allowed_extensions(),
            settle_delay_ms: default_settle_delay_ms(),
        }
    }
}

impl UploadConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Timings of the visual progress animation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressConfig {
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    #[serde(default = "default_total_ms")]
    pub total_ms: u64,
    /// Outcomes arriving faster than this get a catch-up animation.
    #[serde(default = "default_fast_response_ms")]
    pub fast_response_ms: u64,
    #[serde(default = "default_catch_up_ms")]
    pub catch_up_ms: u64,
    #[serde(default = "default_high_water_mark")]
    pub high_water_mark: f64,
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
}

fn default_tick_ms() -> u64 {
    150
}

fn default_total_ms() -> u64 {
    2_000
}

fn default_fast_response_ms() -> u64 {
    1_000
}

fn default_catch_up_ms() -> u64 {
    1_000
}

fn default_high_water_mark() -> f64 {
    75.0
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            total_ms: default_total_ms(),
            fast_response_ms: default_fast_response_ms(),
            catch_up_ms: default_catch_up_ms(),
            high_water_mark: default_high_water_mark(),
            settle_delay_ms: default_settle_delay_ms(),
        }
    }
}

impl ProgressConfig {
    /// Tick period, never zero.
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms())
    }

    fn tick_ms(&self) -> u64 {
        self.tick_ms.max(1)
    }

    pub fn fast_response(&self) -> Duration {
        Duration::from_millis(self.fast_response_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Per-tick increment of the nominal animation.
    pub fn base_increment(&self) -> f64 {
        100.0 * self.tick_ms() as f64 / self.total_ms.max(1) as f64
    }

    /// Number of ticks in the catch-up window.
    pub fn catch_up_ticks(&self) -> f64 {
        (self.catch_up_ms as f64 / self.tick_ms() as f64).max(1.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
