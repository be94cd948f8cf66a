use std::time::Duration;

use crate::config::ServiceConfig;
use crate::error::{BeaconError, Result};
use crate::role::RoleState;

/// Service kind registered with the registry.
pub const SERVICE_KIND: &str = "postgres";

/// TCP health check attached to the registered service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheck {
    /// Address the registry agent connects to.
    pub tcp: String,
    /// Interval between checks.
    pub interval: Duration,
    /// Remove the service after it has been critical this long.
    pub deregister_critical_after: Duration,
}

/// Registry record for the local database node.
///
/// The identity fields are fixed at construction; only the tags change,
/// following the observed role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    id: String,
    name: String,
    port: u16,
    check: HealthCheck,
    tags: Vec<String>,
}

impl ServiceDescriptor {
    /// Build the descriptor for `host` in the configured cluster.
    pub fn new(host: &str, config: &ServiceConfig) -> Result<Self> {
        let host = host.trim();
        if host.is_empty() {
            return Err(BeaconError::HostnameUnresolved);
        }

        Ok(Self {
            id: format!("{}-{}-{}", host, SERVICE_KIND, config.cluster),
            name: format!("{}-{}", SERVICE_KIND, config.cluster),
            port: config.port,
            check: HealthCheck {
                tcp: config.check_address.clone(),
                interval: config.check_interval(),
                deregister_critical_after: config.deregister_after(),
            },
            tags: Vec::new(),
        })
    }

    /// Stable service identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display name shared by every node of the cluster.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn check(&self) -> &HealthCheck {
        &self.check
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Rewrite the tag set for `state`.
    pub fn apply_role(&mut self, state: RoleState) {
        self.tags = state.tags();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_identity() {
        let desc = ServiceDescriptor::new("db1", &ServiceConfig::default()).unwrap();
        assert_eq!(desc.id(), "db1-postgres-main");
        assert_eq!(desc.name(), "postgres-main");
        assert_eq!(desc.port(), 5432);
        assert!(desc.tags().is_empty());
    }

    #[test]
    fn test_descriptor_health_check_defaults() {
        let desc = ServiceDescriptor::new("db1", &ServiceConfig::default()).unwrap();
        assert_eq!(desc.check().tcp, "127.0.0.1:5432");
        assert_eq!(desc.check().interval, Duration::from_secs(30));
        assert_eq!(
            desc.check().deregister_critical_after,
            Duration::from_secs(90 * 60)
        );
    }

    #[test]
    fn test_empty_host_rejected() {
        let result = ServiceDescriptor::new("  ", &ServiceConfig::default());
        assert!(matches!(result, Err(BeaconError::HostnameUnresolved)));
    }

    #[test]
    fn test_apply_role_keeps_identity() {
        let mut desc = ServiceDescriptor::new("db1", &ServiceConfig::default()).unwrap();

        desc.apply_role(RoleState::Primary);
        assert_eq!(desc.tags(), ["primary".to_string()]);

        desc.apply_role(RoleState::Unknown);
        assert!(desc.tags().is_empty());

        desc.apply_role(RoleState::Replica);
        assert_eq!(desc.tags(), ["replica".to_string()]);
        assert_eq!(desc.id(), "db1-postgres-main");
    }
}
