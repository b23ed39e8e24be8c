//! Server configuration

use anyhow::{Context, Result};
use risk_lib::settings::{GeneralSettings, ModelSettings, ReportSettings};
use risk_lib::Settings;
use serde::Deserialize;

/// Default location of the optional settings file (extension resolved by `config`)
pub const DEFAULT_CONFIG_FILE: &str = "config/settings";

/// Environment prefix, e.g. `RISK__MODEL__RUN_ID`
const ENV_PREFIX: &str = "RISK";

/// Full server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub general: GeneralSettings,
    pub model: ModelSettings,
    #[serde(default)]
    pub reports: ReportSettings,
    #[serde(default)]
    pub server: ServerSettings,
}

/// HTTP listener settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// API server port for prediction, monitoring, health and metrics
    #[serde(default = "default_port")]
    pub port: u16,

    /// Instance name attached to structured log events
    #[serde(default = "default_instance_name")]
    pub instance_name: String,
}

fn default_port() -> u16 {
    8000
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "risk-server".to_string())
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: default_port(),
            instance_name: default_instance_name(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from the default settings file and environment
    pub fn load() -> Result<Self> {
        let file = std::env::var("RISK_CONFIG_FILE").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(&file)
    }

    /// Load configuration from `file` (optional) overlaid with environment variables
    pub fn load_from(file: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(file).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("model.features"),
            )
            .build()
            .context("Failed to read configuration")?;

        config
            .try_deserialize()
            .context("Invalid configuration (model.features must be set)")
    }

    /// Split into library settings and listener settings
    pub fn into_parts(self) -> (Settings, ServerSettings) {
        let settings = Settings {
            general: self.general,
            model: self.model,
            reports: self.reports,
        };
        (settings, self.server)
    }
}
