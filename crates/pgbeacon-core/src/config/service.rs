use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Registered service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Cluster name, part of the service name and identifier.
    #[serde(default = "default_cluster")]
    pub cluster: String,

    /// Port advertised in the registry.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Address the agent's TCP health check connects to.
    #[serde(default = "default_check_address")]
    pub check_address: String,

    /// Health check interval in seconds.
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,

    /// Seconds a critical service stays registered before the agent removes it.
    #[serde(default = "default_deregister_after")]
    pub deregister_after_secs: u64,
}

impl ServiceConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn deregister_after(&self) -> Duration {
        Duration::from_secs(self.deregister_after_secs)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            cluster: default_cluster(),
            port: default_port(),
            check_address: default_check_address(),
            check_interval_secs: default_check_interval(),
            deregister_after_secs: default_deregister_after(),
        }
    }
}

fn default_cluster() -> String {
    "main".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_check_address() -> String {
    "127.0.0.1:5432".to_string()
}

fn default_check_interval() -> u64 {
    30
}

fn default_deregister_after() -> u64 {
    90 * 60
}
