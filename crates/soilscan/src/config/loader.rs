use std::path::Path;

use crate::config::schema::SoilscanConfig;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<SoilscanConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

/// Loads `path` when it exists, otherwise returns the built-in defaults.
pub fn load_config_or_default<P: AsRef<Path>>(path: P) -> Result<SoilscanConfig, ConfigError> {
    let path = path.as_ref();
    if path.exists() {
        load_config(path)
    } else {
        log::debug!("No config at {:?}, using defaults", path);
        Ok(SoilscanConfig::default())
    }
}

pub fn load_config_from_str(content: &str) -> Result<SoilscanConfig, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: SoilscanConfig = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &SoilscanConfig) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.api.base_url.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "api.base_url must not be empty".to_string(),
        });
    }

    if !(1..=4).contains(&config.upload.max_files) {
        return Err(ConfigError::Validation {
            message: format!(
                "upload.max_files must be between 1 and 4, got {}",
                config.upload.max_files
            ),
        });
    }

    let progress = &config.progress;
    if progress.tick_ms == 0 {
        return Err(ConfigError::Validation {
            message: "progress.tick_ms must be positive".to_string(),
        });
    }
    if progress.total_ms < progress.tick_ms {
        return Err(ConfigError::Validation {
            message: format!(
                "progress.total_ms ({}) must be at least progress.tick_ms ({})",
                progress.total_ms, progress.tick_ms
            ),
        });
    }
    if !(progress.high_water_mark > 0.0 && progress.high_water_mark < 100.0) {
        return Err(ConfigError::Validation {
            message: format!(
                "progress.high_water_mark must be within (0, 100), got {}",
                progress.high_water_mark
            ),
        });
    }

    Ok(())
}
