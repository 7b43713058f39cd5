//! Configuration module
//!
//! Provides structured configuration for the Sigmaview tools.
//! Configuration can be loaded from:
//! 1. Default values (hardcoded)
//! 2. config.toml file (optional)
//! 3. Environment variables with SIGMAVIEW__ prefix
//!
//! Example environment variable override:
//! SIGMAVIEW__LOGGING__LEVEL=debug
//! SIGMAVIEW__RULES__PATH=custom/path

use serde::Deserialize;
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub rules: RulesConfig,
    pub logging: LogConfig,
}

/// Rules directory configuration
#[derive(Debug, Deserialize)]
pub struct RulesConfig {
    pub path: PathBuf,
}

/// Operational logging configuration (application debug logs)
#[derive(Debug, Deserialize)]
pub struct LogConfig {
    pub level: String,
    pub directory: PathBuf,
    pub filename: String,
    pub console_output: bool,
}

impl AppConfig {
    /// Load configuration from defaults, config.toml, and environment variables
    pub fn new() -> Result<Self, config::ConfigError> {
        let s = config::Config::builder()
            // --- Defaults ---
            // Rules
            .set_default("rules.path", "rules/sigma")?
            // Logging
            .set_default("logging.level", "info")?
            .set_default("logging.directory", "logs")?
            .set_default("logging.filename", "sigmaview.log")?
            .set_default("logging.console_output", true)?
            // --- Sources ---
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("SIGMAVIEW").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            rules: RulesConfig {
                path: PathBuf::from("rules/sigma"),
            },
            logging: LogConfig {
                level: "info".to_string(),
                directory: PathBuf::from("logs"),
                filename: "sigmaview.log".to_string(),
                console_output: true,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_loads_defaults() {
        let cfg = AppConfig::new().unwrap();
        assert_eq!(cfg.logging.level, "info");
        assert!(cfg.logging.console_output);
        assert_eq!(cfg.rules.path, PathBuf::from("rules/sigma"));
    }
}
