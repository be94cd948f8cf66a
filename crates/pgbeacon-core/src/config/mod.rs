mod consul;
mod database;
mod logging;
mod service;

pub use consul::ConsulConfig;
pub use database::DatabaseConfig;
pub use logging::{LogFormat, LoggingConfig};
pub use service::ServiceConfig;

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{BeaconError, Result};

/// Root configuration for pgbeacon.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BeaconConfig {
    /// Database connection and polling.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Consul agent connection and resync.
    #[serde(default)]
    pub consul: ConsulConfig,

    /// Shape of the registered service.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Log output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl BeaconConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            BeaconError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        tracing::debug!(path = %path.display(), "Loaded configuration file");
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse_toml(content: &str) -> Result<Self> {
        let content = substitute_env_vars(content);

        toml::from_str(&content)
            .map_err(|e| BeaconError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.database.check_interval_secs == 0 {
            return Err(BeaconError::Config(
                "database.check_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.consul.resync_interval_secs == 0 {
            return Err(BeaconError::Config(
                "consul.resync_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.service.cluster.trim().is_empty() {
            return Err(BeaconError::Config(
                "service.cluster must not be empty".to_string(),
            ));
        }
        if self.consul.endpoint.trim().is_empty() {
            return Err(BeaconError::Config(
                "consul.endpoint must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Substitute environment variables in the format ${VAR_NAME}.
///
/// Unset variables are left as written.
fn substitute_env_vars(content: &str) -> String {
    let Ok(re) = regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}") else {
        return content.to_string();
    };

    re.replace_all(content, |caps: &regex_lite::Captures<'_>| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}
