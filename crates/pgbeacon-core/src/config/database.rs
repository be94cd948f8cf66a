use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection string, either a `postgres://` URL or libpq `key=value` pairs.
    /// Merged with the `PG*` environment variables at startup.
    #[serde(default = "default_connection")]
    pub connection: String,

    /// Seconds between role probes.
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,

    /// Upper bound on a single role probe, in seconds.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
}

impl DatabaseConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            connection: default_connection(),
            check_interval_secs: default_check_interval(),
            probe_timeout_secs: default_probe_timeout(),
        }
    }
}

fn default_connection() -> String {
    "user=postgres dbname=postgres".to_string()
}

fn default_check_interval() -> u64 {
    10
}

fn default_probe_timeout() -> u64 {
    5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_database_config() {
        let toml = r#"
            connection = "host=/var/run/postgresql user=monitor"
            check_interval_secs = 3
        "#;

        let config: DatabaseConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.connection, "host=/var/run/postgresql user=monitor");
        assert_eq!(config.check_interval(), Duration::from_secs(3));
        assert_eq!(config.probe_timeout(), Duration::from_secs(5));
    }
}
