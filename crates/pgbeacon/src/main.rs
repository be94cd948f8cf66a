mod cli;
mod logging;

use anyhow::Result;
use clap::Parser;
use pgbeacon_runtime::PgEnvironment;

fn main() -> Result<()> {
    // Load .env before clap reads env-backed flags
    dotenvy::dotenv().ok();

    let cli = cli::Cli::parse();
    // Must happen before the runtime starts its worker threads
    let pg_env = PgEnvironment::capture();

    run(cli, pg_env)
}

#[tokio::main]
async fn run(cli: cli::Cli, pg_env: PgEnvironment) -> Result<()> {
    cli.execute(pg_env).await
}
