//! Configuration for the flotilla CLI

use flotilla_deployment::OrchestratorConfig;
use serde::{Deserialize, Serialize};

/// Main CLI configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    /// Orchestrator behaviour
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl CliConfig {
    /// Load configuration: defaults, then the optional file, then
    /// `FLOTILLA_*` environment variables (`FLOTILLA_LOGGING__LEVEL=debug`)
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        // Add default configuration
        builder = builder.add_source(config::Config::try_from(&CliConfig::default())?);

        // Add file configuration if provided
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // Add environment variables with FLOTILLA_ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("FLOTILLA")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = CliConfig::default();
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
        assert!(!config.orchestrator.partial_launch);
        assert!(config.orchestrator.destroy_on_terminal);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let path = std::env::temp_dir().join(format!("flotilla-config-{}.toml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[orchestrator]\npartial_launch = true\n\n[logging]\njson = true"
        )
        .unwrap();

        let config = CliConfig::load(path.to_str()).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert!(config.orchestrator.partial_launch);
        assert!(config.orchestrator.destroy_on_terminal);
        assert!(config.logging.json);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_missing_file_is_optional() {
        let config = CliConfig::load(Some("/nonexistent/flotilla")).unwrap();
        assert_eq!(config.orchestrator.event_channel_capacity, 4096);
    }
}
