//! The pgbeacon process runtime.
//!
//! Connects to PostgreSQL, prepares the Consul registration, starts the
//! role monitor and the service registrar, and waits for a shutdown signal.

use std::fmt;
use std::sync::Arc;

use tracing::{error, info};

use pgbeacon_core::{BeaconConfig, BeaconError, Result};
use pgbeacon_runtime::{
    state_channel, ConnectionParams, ConsulClient, MonitorConfig, PgConnectionHandle,
    RegistrarConfig, RoleMonitor, ServiceRegistrar, ShutdownCoordinator,
};

/// Environment lookup used to resolve `PG*` connection settings.
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// The main pgbeacon runtime.
pub struct Beacon {
    config: BeaconConfig,
    env: EnvLookup,
    shutdown: ShutdownCoordinator,
}

impl Beacon {
    /// Create a new builder for configuring pgbeacon.
    pub fn builder() -> BeaconBuilder {
        BeaconBuilder::new()
    }

    /// Get the configuration.
    pub fn config(&self) -> &BeaconConfig {
        &self.config
    }

    /// Handle for requesting shutdown from another task.
    pub fn shutdown_handle(&self) -> ShutdownCoordinator {
        self.shutdown.clone()
    }

    /// Request shutdown.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Run until a shutdown signal arrives.
    ///
    /// Fails without starting any task if the connection parameters cannot
    /// be resolved, the Consul endpoint is invalid, or the first database
    /// connection cannot be made.
    pub async fn run(self) -> Result<()> {
        info!("pgbeacon runtime starting");

        let env = Arc::clone(&self.env);
        let params = ConnectionParams::resolve(&self.config.database.connection, |var| env(var))
            .inspect_err(|e| error!(error = %e, "Cannot resolve connection parameters"))?;
        tracing::debug!(params = ?params, "Resolved connection parameters");

        let registry = ConsulClient::new(&self.config.consul)
            .inspect_err(|e| error!(error = %e, "Cannot create Consul client"))?;

        let probe = PgConnectionHandle::connect(&params, self.config.database.probe_timeout())
            .await
            .inspect_err(|e| error!(error = %e, "Cannot connect to database"))?;
        info!("Connected to database");

        let registrar = ServiceRegistrar::start(registry, self.registrar_config()).await;
        let monitor = RoleMonitor::new(
            probe,
            MonitorConfig {
                interval: self.config.database.check_interval(),
            },
        );

        let (states_tx, states_rx) = state_channel();
        let token = self.shutdown.token();

        self.shutdown
            .spawn("role-monitor", monitor.run(states_tx, token.clone()));
        self.shutdown.spawn("service-registrar", async move {
            let last = registrar.run(states_rx, token).await;
            tracing::debug!(state = %last, "Last known database state");
        });

        info!(
            tasks = self.shutdown.running(),
            "pgbeacon runtime started successfully"
        );

        let token = self.shutdown.token();
        tokio::select! {
            _ = shutdown_signal() => {}
            _ = token.cancelled() => {
                info!("Received shutdown notification");
            }
        }

        info!("Starting graceful shutdown...");
        self.shutdown.cancel();
        self.shutdown.wait().await;

        info!("pgbeacon runtime stopped");
        Ok(())
    }

    fn registrar_config(&self) -> RegistrarConfig {
        RegistrarConfig {
            resync_interval: self.config.consul.resync_interval(),
            service: self.config.service.clone(),
        }
    }
}

impl fmt::Debug for Beacon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Beacon")
            .field("config", &self.config)
            .field("shutdown", &self.shutdown)
            .finish_non_exhaustive()
    }
}

/// Builder for configuring the pgbeacon runtime.
pub struct BeaconBuilder {
    config: Option<BeaconConfig>,
    env: EnvLookup,
}

impl BeaconBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            config: None,
            env: Arc::new(|var| std::env::var(var).ok()),
        }
    }

    /// Set the configuration.
    pub fn config(mut self, config: BeaconConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Replace the process environment as the source of `PG*` settings.
    pub fn env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Arc::new(lookup);
        self
    }

    /// Build the pgbeacon runtime.
    pub fn build(self) -> Result<Beacon> {
        let config = self
            .config
            .ok_or_else(|| BeaconError::Config("Configuration is required".to_string()))?;
        config.validate()?;

        Ok(Beacon {
            config,
            env: self.env,
            shutdown: ShutdownCoordinator::new(),
        })
    }
}

impl Default for BeaconBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve on SIGINT or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT"),
            Err(e) => {
                error!(error = %e, "Failed to install SIGINT handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
                info!("Received SIGTERM");
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_builder_requires_config() {
        let err = BeaconBuilder::new().build().unwrap_err();
        assert!(matches!(err, BeaconError::Config(_)));
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let mut config = BeaconConfig::default();
        config.consul.resync_interval_secs = 0;
        assert!(Beacon::builder().config(config).build().is_err());
    }

    #[test]
    fn test_registrar_config_from_settings() {
        let mut config = BeaconConfig::default();
        config.service.cluster = "billing".to_string();
        config.consul.resync_interval_secs = 45;

        let beacon = Beacon::builder().config(config).build().unwrap();
        let registrar = beacon.registrar_config();

        assert_eq!(registrar.service.cluster, "billing");
        assert_eq!(registrar.resync_interval, std::time::Duration::from_secs(45));
        assert_eq!(registrar.service.port, 5432);
    }

    #[tokio::test]
    async fn test_unresolvable_parameters_start_nothing() {
        let mut config = BeaconConfig::default();
        config.database.connection = "port=notaport".to_string();

        let beacon = Beacon::builder()
            .config(config)
            .env(|var| (var == "PGPORT").then(|| "alsonotaport".to_string()))
            .build()
            .unwrap();
        let shutdown = beacon.shutdown_handle();

        let err = beacon.run().await.unwrap_err();
        assert!(matches!(err, BeaconError::InvalidConnectionParameters(_)));
        assert_eq!(shutdown.running(), 0);
    }

    #[tokio::test]
    async fn test_invalid_consul_endpoint_is_fatal() {
        let mut config = BeaconConfig::default();
        config.consul.endpoint = "http://[bad".to_string();

        let beacon = Beacon::builder().config(config).env(no_env).build().unwrap();
        let err = beacon.run().await.unwrap_err();
        assert!(matches!(err, BeaconError::Registry(_)));
    }

    #[tokio::test]
    async fn test_unreachable_database_is_fatal() {
        let mut config = BeaconConfig::default();
        config.database.connection =
            "host=127.0.0.1 port=1 user=postgres connect_timeout=2".to_string();

        let beacon = Beacon::builder().config(config).env(no_env).build().unwrap();
        let shutdown = beacon.shutdown_handle();

        let err = beacon.run().await.unwrap_err();
        assert!(matches!(err, BeaconError::Database(_)));
        assert_eq!(shutdown.running(), 0);
    }
}
