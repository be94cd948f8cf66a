use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use pgbeacon_core::{RoleProbe, RoleState};

use super::channel::StateSender;

/// Role monitor configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Interval between role probes.
    pub interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
        }
    }
}

/// Polls the database role and hands every observation to the registrar.
///
/// There is no deduplication here: each tick produces exactly one send.
pub struct RoleMonitor<P> {
    probe: P,
    config: MonitorConfig,
}

impl<P: RoleProbe> RoleMonitor<P> {
    /// Create a new monitor owning `probe`.
    pub fn new(probe: P, config: MonitorConfig) -> Self {
        Self { probe, config }
    }

    /// Run until `shutdown` is cancelled or the registrar goes away.
    /// The probe is closed on exit.
    pub async fn run(mut self, states: StateSender, shutdown: CancellationToken) {
        let period = self.config.interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(interval = ?period, "Role monitor started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let state = self.observe().await;

            // Blocks until the registrar takes the value.
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                sent = states.send(state) => {
                    if sent.is_err() {
                        tracing::warn!("State channel closed, stopping role monitor");
                        break;
                    }
                }
            }
        }

        self.probe.close().await;
        tracing::info!("Role monitor stopped");
    }

    async fn observe(&mut self) -> RoleState {
        match self.probe.probe_role().await {
            Ok(is_primary) => {
                tracing::debug!(primary = is_primary, "Database is alive");
                RoleState::from_is_primary(is_primary)
            }
            Err(e) => {
                tracing::error!(error = %e, "Database is dead");
                if !self.probe.reconnect().await {
                    tracing::debug!("Database still unreachable, will retry on next tick");
                }
                RoleState::Unknown
            }
        }
    }
}
