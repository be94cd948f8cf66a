mod probe;
mod run;
mod settings;

pub use probe::ProbeCommand;
pub use run::RunCommand;
pub use settings::Settings;

use anyhow::Result;
use clap::{Parser, Subcommand};
use pgbeacon_runtime::PgEnvironment;

/// pgbeacon - publish the PostgreSQL replication role to Consul
#[derive(Parser)]
#[command(name = "pgbeacon")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub settings: Settings,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Watch the database and keep the Consul registration current (default).
    Run(RunCommand),

    /// Probe the database role once and print it.
    Probe(ProbeCommand),
}

impl Cli {
    /// Execute the CLI command. `pg_env` is the libpq environment captured
    /// at startup.
    pub async fn execute(self, pg_env: PgEnvironment) -> Result<()> {
        match self.command {
            Some(Commands::Run(cmd)) => cmd.execute(self.settings, pg_env).await,
            Some(Commands::Probe(cmd)) => cmd.execute(self.settings, pg_env).await,
            None => RunCommand::default().execute(self.settings, pg_env).await,
        }
    }
}
