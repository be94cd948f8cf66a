use anyhow::Result;
use clap::Args;
use console::style;

use pgbeacon_core::{RoleProbe, RoleState};
use pgbeacon_runtime::{ConnectionParams, PgConnectionHandle, PgEnvironment};

use super::Settings;
use crate::logging;

/// Connect once, print the node's role, and exit.
#[derive(Args, Debug, Default)]
pub struct ProbeCommand {
    /// Print only the role name.
    #[arg(short, long)]
    pub quiet: bool,
}

impl ProbeCommand {
    /// Execute the probe command.
    pub async fn execute(self, settings: Settings, pg_env: PgEnvironment) -> Result<()> {
        let config = settings.load_config()?;
        logging::init(&config.logging, settings.debug)?;

        let params =
            ConnectionParams::resolve(&config.database.connection, |var| pg_env.get(var))?;
        let mut handle = PgConnectionHandle::connect(&params, config.database.probe_timeout()).await?;

        let probed = handle.probe_role().await;
        handle.close().await;
        let state = RoleState::from_is_primary(probed?);

        if self.quiet {
            println!("{}", state);
            return Ok(());
        }

        let role = match state {
            RoleState::Primary => style(state.as_str()).green().bold(),
            RoleState::Replica => style(state.as_str()).cyan().bold(),
            RoleState::Unknown => style(state.as_str()).yellow().bold(),
        };
        let host = params.host.as_deref().unwrap_or("localhost");

        println!();
        println!("  {} {}", style("Database:").bold(), host);
        println!("  {} {}", style("Role:").bold(), role);
        println!();

        Ok(())
    }
}
