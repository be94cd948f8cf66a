use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Consul agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsulConfig {
    /// Agent HTTP API address. A bare `host:port` implies `http://`.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// ACL token sent with every request.
    #[serde(default)]
    pub token: Option<String>,

    /// Seconds between re-assertions of an unchanged registration.
    #[serde(default = "default_resync_interval")]
    pub resync_interval_secs: u64,

    /// HTTP timeout for each agent call, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl ConsulConfig {
    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Endpoint with an explicit scheme.
    pub fn base_url(&self) -> String {
        let endpoint = self.endpoint.trim().trim_end_matches('/');
        if endpoint.contains("://") {
            endpoint.to_string()
        } else {
            format!("http://{}", endpoint)
        }
    }
}

impl Default for ConsulConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            token: None,
            resync_interval_secs: default_resync_interval(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_endpoint() -> String {
    "127.0.0.1:8500".to_string()
}

fn default_resync_interval() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    10
}
