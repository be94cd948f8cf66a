use std::time::Duration;

use serde::{Deserialize, Serialize};

use pgbeacon_core::service::ServiceDescriptor;

/// Body of `PUT /v1/agent/service/register`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AgentServiceRegistration {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    pub tags: Vec<String>,
    pub port: u16,
    pub check: AgentCheck,
}

/// Health check attached to a registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AgentCheck {
    #[serde(rename = "TCP")]
    pub tcp: String,
    pub interval: String,
    pub deregister_critical_service_after: String,
}

impl From<&ServiceDescriptor> for AgentServiceRegistration {
    fn from(service: &ServiceDescriptor) -> Self {
        let check = service.check();
        Self {
            id: service.id().to_string(),
            name: service.name().to_string(),
            tags: service.tags().to_vec(),
            port: service.port(),
            check: AgentCheck {
                tcp: check.tcp.clone(),
                interval: go_duration(check.interval),
                deregister_critical_service_after: go_duration(check.deregister_critical_after),
            },
        }
    }
}

/// Subset of `GET /v1/agent/self`.
#[derive(Debug, Deserialize)]
pub(crate) struct AgentSelf {
    #[serde(rename = "Config")]
    pub config: AgentSelfConfig,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AgentSelfConfig {
    #[serde(rename = "NodeName", default)]
    pub node_name: String,
}

/// Render a duration in the syntax Consul parses (`90m`, `30s`, `250ms`).
pub fn go_duration(d: Duration) -> String {
    let millis = d.as_millis();
    if millis % 1000 != 0 {
        return format!("{}ms", millis);
    }
    let secs = d.as_secs();
    if secs != 0 && secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs != 0 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}
