use std::time::Duration;

use tokio_util::sync::CancellationToken;

use pgbeacon_core::config::ServiceConfig;
use pgbeacon_core::error::{BeaconError, Result};
use pgbeacon_core::{RoleState, ServiceDescriptor, ServiceRegistry};

use super::channel::StateReceiver;
use super::timer::RenewalTimer;

/// Reason attached to maintenance mode while the database is unreachable.
pub const MAINTENANCE_REASON: &str = "lost database connection";

/// Service registrar configuration.
#[derive(Debug, Clone)]
pub struct RegistrarConfig {
    /// How long an unchanged registration goes before it is re-asserted.
    pub resync_interval: Duration,
    /// Shape of the registered service, including the cluster name.
    pub service: ServiceConfig,
}

impl Default for RegistrarConfig {
    fn default() -> Self {
        Self {
            resync_interval: Duration::from_secs(30),
            service: ServiceConfig::default(),
        }
    }
}

/// Publishes the observed role to the service registry.
///
/// Writes happen when the role changes and, absent changes, once per resync
/// interval. Registry failures are logged and retried by the next write.
pub struct ServiceRegistrar<R> {
    registry: R,
    config: RegistrarConfig,
    service: Option<ServiceDescriptor>,
    current: RoleState,
}

impl<R: ServiceRegistry> ServiceRegistrar<R> {
    /// Resolve the node's host name and prepare the service record.
    ///
    /// No registry write happens here. If no host name can be found the
    /// registrar still runs, consuming states without publishing them.
    pub async fn start(registry: R, config: RegistrarConfig) -> Self {
        let service = match resolve_host(&registry, local_hostname).await {
            Ok(host) => ServiceDescriptor::new(&host, &config.service),
            Err(e) => Err(e),
        };

        let service = match service {
            Ok(service) => {
                tracing::info!(service_id = service.id(), "Prepared service registration");
                Some(service)
            }
            Err(e) => {
                tracing::error!(error = %e, "Registry updates disabled");
                None
            }
        };

        Self::with_service(registry, config, service)
    }

    /// Create a registrar around an already built service record.
    pub fn with_service(
        registry: R,
        config: RegistrarConfig,
        service: Option<ServiceDescriptor>,
    ) -> Self {
        Self {
            registry,
            config,
            service,
            current: RoleState::Unknown,
        }
    }

    /// Last state received from the monitor.
    pub fn current_state(&self) -> RoleState {
        self.current
    }

    /// The service record, if one could be built.
    pub fn service(&self) -> Option<&ServiceDescriptor> {
        self.service.as_ref()
    }

    /// Run until `shutdown` is cancelled or the monitor goes away.
    /// Returns the last known state.
    pub async fn run(mut self, mut states: StateReceiver, shutdown: CancellationToken) -> RoleState {
        let mut renewal = RenewalTimer::new(self.config.resync_interval);

        tracing::info!(
            resync = ?self.config.resync_interval,
            "Service registrar started"
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                received = states.recv() => {
                    let Some(state) = received else {
                        tracing::warn!("State channel closed, stopping service registrar");
                        break;
                    };
                    if state == self.current {
                        continue;
                    }

                    renewal.stop();
                    tracing::info!(
                        new_state = %state,
                        old_state = %self.current,
                        "Database status change detected"
                    );
                    self.current = state;
                    self.push().await;
                    renewal.reset();
                }
                _ = renewal.fired() => {
                    tracing::debug!(state = %self.current, "No status changes, renewing service");
                    self.push().await;
                    renewal.reset();
                }
            }
        }

        tracing::info!("Service registrar stopped");
        self.current
    }

    /// Write the registration for the current state, then set maintenance
    /// mode to match it.
    async fn push(&mut self) {
        let state = self.current;
        let Some(service) = self.service.as_mut() else {
            tracing::debug!(state = %state, "No service registration, skipping registry update");
            return;
        };

        service.apply_role(state);

        if let Err(e) = self.registry.upsert_service(service).await {
            tracing::error!(service_id = service.id(), error = %e, "Failed to register service");
            return;
        }

        let result = if state.requires_maintenance() {
            self.registry
                .enable_maintenance(service.id(), MAINTENANCE_REASON)
                .await
        } else {
            self.registry.disable_maintenance(service.id()).await
        };

        if let Err(e) = result {
            tracing::error!(
                service_id = service.id(),
                error = %e,
                "Failed to update maintenance mode"
            );
        }
    }
}

/// Host name for the service identifier: the agent's node name, falling
/// back to `local`.
pub(crate) async fn resolve_host<R, F>(registry: &R, local: F) -> Result<String>
where
    R: ServiceRegistry,
    F: FnOnce() -> Option<String>,
{
    match registry.agent_node_name().await {
        Ok(name) if !name.trim().is_empty() => return Ok(name.trim().to_string()),
        Ok(_) => tracing::warn!("Agent reported an empty node name, using local hostname"),
        Err(e) => tracing::warn!(error = %e, "Could not get node name from agent, using local hostname"),
    }

    local()
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .ok_or(BeaconError::HostnameUnresolved)
}

fn local_hostname() -> Option<String> {
    hostname::get()
        .ok()
        .map(|h| h.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::channel::state_channel;
    use crate::testing::{RecordingRegistry, RegistryCall};
    use std::io;
    use std::sync::{Arc, Mutex};

    const RESYNC: Duration = Duration::from_secs(30);

    fn registrar(registry: &RecordingRegistry) -> ServiceRegistrar<RecordingRegistry> {
        let config = RegistrarConfig {
            resync_interval: RESYNC,
            ..Default::default()
        };
        let service = ServiceDescriptor::new("db1", &config.service).unwrap();
        ServiceRegistrar::with_service(registry.clone(), config, Some(service))
    }

    /// Log output of the thread-local subscriber installed by [`capture_logs`].
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn capture_logs() -> (CapturedLogs, tracing::subscriber::DefaultGuard) {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        (logs, tracing::subscriber::set_default(subscriber))
    }

    fn tags(tag: &str) -> Vec<String> {
        vec![tag.to_string()]
    }

    /// Feed `sequence` through the channel, then close it.
    async fn feed(registry: &RecordingRegistry, sequence: &[RoleState]) -> RoleState {
        let (tx, rx) = state_channel();
        let task = tokio::spawn(registrar(registry).run(rx, CancellationToken::new()));
        for state in sequence {
            tx.send(*state).await.unwrap();
        }
        drop(tx);
        task.await.unwrap()
    }

    #[test]
    fn test_registrar_config_default() {
        let config = RegistrarConfig::default();
        assert_eq!(config.service.cluster, "main");
        assert_eq!(config.resync_interval, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_start_uses_agent_node_name() {
        let registry = RecordingRegistry::new("consul-node-7");
        let registrar = ServiceRegistrar::start(registry.clone(), RegistrarConfig::default()).await;

        assert_eq!(
            registrar.service().map(|s| s.id()),
            Some("consul-node-7-postgres-main")
        );
        assert_eq!(registrar.current_state(), RoleState::Unknown);
        // Startup only looks up the node name; nothing is written.
        assert_eq!(registry.calls(), vec![RegistryCall::NodeName]);
    }

    #[tokio::test]
    async fn test_start_takes_cluster_from_service_config() {
        let registry = RecordingRegistry::new("db2");
        let mut config = RegistrarConfig::default();
        config.service.cluster = "billing".to_string();

        let registrar = ServiceRegistrar::start(registry, config).await;
        let service = registrar.service().unwrap();
        assert_eq!(service.id(), "db2-postgres-billing");
        assert_eq!(service.name(), "postgres-billing");
    }

    #[tokio::test]
    async fn test_resolve_host_falls_back_to_local() {
        let registry = RecordingRegistry::without_node_name();
        let host = resolve_host(&registry, || Some("local-box\n".to_string()))
            .await
            .unwrap();
        assert_eq!(host, "local-box");

        let registry = RecordingRegistry::new("   ");
        let host = resolve_host(&registry, || Some("local-box".to_string()))
            .await
            .unwrap();
        assert_eq!(host, "local-box");
    }

    #[tokio::test]
    async fn test_resolve_host_fails_when_both_empty() {
        let registry = RecordingRegistry::without_node_name();
        let result = resolve_host(&registry, || Some(String::new())).await;
        assert!(matches!(result, Err(BeaconError::HostnameUnresolved)));
    }

    #[tokio::test]
    async fn test_duplicates_are_absorbed() {
        let sequences: &[&[RoleState]] = &[
            &[RoleState::Primary, RoleState::Primary, RoleState::Primary],
            &[RoleState::Unknown, RoleState::Replica, RoleState::Replica],
            &[
                RoleState::Replica,
                RoleState::Primary,
                RoleState::Primary,
                RoleState::Unknown,
                RoleState::Unknown,
                RoleState::Primary,
            ],
        ];

        for sequence in sequences {
            let registry = RecordingRegistry::new("db1");
            let last = feed(&registry, sequence).await;

            assert_eq!(last, *sequence.last().unwrap());

            let mut previous = RoleState::Unknown;
            let mut expected = Vec::new();
            for state in sequence.iter() {
                if *state != previous {
                    expected.push(state.tags());
                    previous = *state;
                }
            }
            assert_eq!(registry.upserted_tags(), expected);
        }
    }

    #[tokio::test]
    async fn test_change_pushes_registration_then_maintenance() {
        let registry = RecordingRegistry::new("db1");
        feed(&registry, &[RoleState::Primary, RoleState::Unknown]).await;

        let id = "db1-postgres-main".to_string();
        assert_eq!(
            registry.calls(),
            vec![
                RegistryCall::Upsert {
                    id: id.clone(),
                    tags: tags("primary"),
                },
                RegistryCall::DisableMaintenance { id: id.clone() },
                RegistryCall::Upsert {
                    id: id.clone(),
                    tags: vec![],
                },
                RegistryCall::EnableMaintenance {
                    id,
                    reason: MAINTENANCE_REASON.to_string(),
                },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_renewal_repeats_identical_upserts() {
        let registry = RecordingRegistry::new("db1");
        let (tx, rx) = state_channel();
        let token = CancellationToken::new();
        let task = tokio::spawn(registrar(&registry).run(rx, token.clone()));

        tx.send(RoleState::Replica).await.unwrap();
        tokio::time::sleep(RESYNC * 3 + Duration::from_secs(5)).await;

        token.cancel();
        task.await.unwrap();

        assert_eq!(registry.upserted_tags(), vec![tags("replica"); 4]);
        assert_eq!(registry.maintenance_enabled_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_does_not_reset_renewal() {
        let registry = RecordingRegistry::new("db1");
        let (tx, rx) = state_channel();
        let token = CancellationToken::new();
        let task = tokio::spawn(registrar(&registry).run(rx, token.clone()));

        tx.send(RoleState::Primary).await.unwrap();
        tokio::time::sleep(Duration::from_secs(20)).await;
        tx.send(RoleState::Primary).await.unwrap();

        // Renewal is still due 30s after the change, not after the duplicate.
        tokio::time::sleep(Duration::from_secs(12)).await;
        assert_eq!(registry.upserted_tags().len(), 2);

        token.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_restarts_renewal_period() {
        let registry = RecordingRegistry::new("db1");
        let (tx, rx) = state_channel();
        let token = CancellationToken::new();
        let task = tokio::spawn(registrar(&registry).run(rx, token.clone()));

        tokio::time::sleep(Duration::from_secs(25)).await;
        tx.send(RoleState::Primary).await.unwrap();

        // The startup timer would have fired at 30s; the change pushed it to 55s.
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(registry.upserted_tags(), vec![tags("primary")]);

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(registry.upserted_tags(), vec![tags("primary"); 2]);

        token.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_upsert_retried_on_renewal() {
        let registry = RecordingRegistry::new("db1");
        registry.set_fail_upserts(true);

        let (tx, rx) = state_channel();
        let token = CancellationToken::new();
        let task = tokio::spawn(registrar(&registry).run(rx, token.clone()));

        tx.send(RoleState::Primary).await.unwrap();
        // A failed upsert skips the maintenance toggle.
        assert!(!registry
            .calls()
            .iter()
            .any(|c| matches!(c, RegistryCall::DisableMaintenance { .. })));

        registry.set_fail_upserts(false);
        tokio::time::sleep(RESYNC + Duration::from_secs(1)).await;

        assert_eq!(registry.upserted_tags(), vec![tags("primary"); 2]);
        assert!(registry
            .calls()
            .iter()
            .any(|c| matches!(c, RegistryCall::DisableMaintenance { .. })));

        token.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_maintenance_toggle_is_logged_and_swallowed() {
        let (logs, _guard) = capture_logs();
        let registry = RecordingRegistry::new("db1");
        registry.set_fail_maintenance(true);

        let (tx, rx) = state_channel();
        let token = CancellationToken::new();
        let task = tokio::spawn(registrar(&registry).run(rx, token.clone()));

        tx.send(RoleState::Primary).await.unwrap();
        tx.send(RoleState::Unknown).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(registry.upserted_tags(), vec![tags("primary"), vec![]]);
        assert_eq!(registry.maintenance_enabled_count(), 1);
        assert_eq!(
            logs.contents()
                .matches("Failed to update maintenance mode")
                .count(),
            2
        );

        // Still running: the renewal pushes again and the toggle now succeeds.
        registry.set_fail_maintenance(false);
        tokio::time::sleep(RESYNC).await;
        assert_eq!(registry.upserted_tags(), vec![tags("primary"), vec![], vec![]]);
        assert_eq!(registry.maintenance_enabled_count(), 2);
        assert_eq!(
            logs.contents()
                .matches("Failed to update maintenance mode")
                .count(),
            2
        );

        token.cancel();
        assert_eq!(task.await.unwrap(), RoleState::Unknown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_without_service_consumes_states_silently() {
        let registry = RecordingRegistry::without_node_name();
        let (tx, rx) = state_channel();
        let token = CancellationToken::new();
        let registrar = ServiceRegistrar::with_service(
            registry.clone(),
            RegistrarConfig::default(),
            None,
        );
        let task = tokio::spawn(registrar.run(rx, token.clone()));

        tx.send(RoleState::Primary).await.unwrap();
        tx.send(RoleState::Unknown).await.unwrap();
        tokio::time::sleep(Duration::from_secs(120)).await;

        token.cancel();
        assert_eq!(task.await.unwrap(), RoleState::Unknown);
        assert!(registry.calls().is_empty());
    }
}
