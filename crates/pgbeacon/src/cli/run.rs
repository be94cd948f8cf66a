use anyhow::Result;
use clap::Args;
use tracing::info;

use super::Settings;
use crate::logging;
use pgbeacon::Beacon;
use pgbeacon_runtime::PgEnvironment;

/// Run the sidecar until SIGINT or SIGTERM.
#[derive(Args, Debug, Default)]
pub struct RunCommand {}

impl RunCommand {
    /// Execute the run command.
    pub async fn execute(self, settings: Settings, pg_env: PgEnvironment) -> Result<()> {
        let config = settings.load_config()?;
        logging::init(&config.logging, settings.debug)?;

        info!(
            version = env!("CARGO_PKG_VERSION"),
            cluster = %config.service.cluster,
            consul = %config.consul.base_url(),
            check_interval = ?config.database.check_interval(),
            "pgbeacon starting"
        );

        let beacon = Beacon::builder()
            .config(config)
            .env(move |var| pg_env.get(var))
            .build()?;

        // Blocks until shutdown
        beacon.run().await?;

        Ok(())
    }
}
