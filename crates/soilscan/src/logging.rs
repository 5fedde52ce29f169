//! Global log output for binaries embedding the library.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::config::LoggingConfig;
use crate::error::{Result, SoilscanError};

/// Builds the level filter. `RUST_LOG` wins over the configured level.
pub fn env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| SoilscanError::Logging(format!("Invalid log level '{}': {}", config.level, e))),
    }
}

/// Installs the global tracing subscriber and routes `log` records into it.
///
/// Call once per process; a second call fails.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = env_filter(config)?;
    let output = if config.json {
        fmt::layer().json().with_target(true).boxed()
    } else {
        fmt::layer().with_target(false).boxed()
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(output);
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| SoilscanError::Logging(e.to_string()))?;
    tracing_log::LogTracer::init().map_err(|e| SoilscanError::Logging(e.to_string()))?;

    log::debug!("Logging initialized at level {}", config.level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_env_filter_uses_config_level() {
        std::env::remove_var("RUST_LOG");
        let config = LoggingConfig {
            level: "soilscan=debug,warn".to_string(),
            json: false,
        };
        let filter = env_filter(&config).unwrap();
        assert!(filter.to_string().contains("soilscan=debug"));
    }

    #[test]
    #[serial]
    fn test_rust_log_overrides_config() {
        std::env::set_var("RUST_LOG", "warn");
        let filter = env_filter(&LoggingConfig::default());
        std::env::remove_var("RUST_LOG");

        assert_eq!(filter.unwrap().to_string(), "warn");
    }
}
