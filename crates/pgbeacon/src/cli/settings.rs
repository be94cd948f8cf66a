use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use clap::{Args, ValueEnum};
use pgbeacon_core::config::LogFormat;
use pgbeacon_core::BeaconConfig;

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "pgbeacon.toml";

/// Settings shared by every subcommand. Flags override the config file.
#[derive(Args, Debug, Default)]
pub struct Settings {
    /// Configuration file path.
    #[arg(short, long, global = true, env = "PGBEACON_CONFIG")]
    pub config: Option<PathBuf>,

    /// PostgreSQL connection string (URL or key=value pairs).
    #[arg(long, global = true, env = "PGBEACON_DB", hide_env_values = true)]
    pub db: Option<String>,

    /// How often to probe the database role (e.g. 10s, 1m).
    #[arg(long, global = true, env = "PGBEACON_CHECK_INTERVAL", value_parser = humantime::parse_duration)]
    pub check_interval: Option<Duration>,

    /// Cluster name used in the service name and tags.
    #[arg(long, global = true, env = "PGBEACON_CLUSTER")]
    pub cluster: Option<String>,

    /// Consul agent address.
    #[arg(long, global = true, env = "PGBEACON_CONSUL")]
    pub consul: Option<String>,

    /// How often to re-assert an unchanged registration (e.g. 30s).
    #[arg(long, global = true, env = "PGBEACON_CONSUL_RESYNC", value_parser = humantime::parse_duration)]
    pub consul_resync: Option<Duration>,

    /// Consul ACL token.
    #[arg(long, global = true, env = "CONSUL_HTTP_TOKEN", hide_env_values = true)]
    pub consul_token: Option<String>,

    /// Log output format.
    #[arg(long, global = true, env = "PGBEACON_LOG_FORMAT", value_enum)]
    pub log_format: Option<LogFormatArg>,

    /// Enable debug logging.
    #[arg(long, global = true, env = "PGBEACON_DEBUG")]
    pub debug: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

impl Settings {
    /// Resolve defaults, then the config file, then flags.
    pub fn load_config(&self) -> Result<BeaconConfig> {
        let mut config = match &self.config {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Configuration file not found: {}", path.display());
                }
                BeaconConfig::from_file(path)?
            }
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                BeaconConfig::from_file(DEFAULT_CONFIG_FILE)?
            }
            None => BeaconConfig::default(),
        };

        self.apply(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply command-line overrides.
    fn apply(&self, config: &mut BeaconConfig) -> Result<()> {
        if let Some(db) = &self.db {
            config.database.connection = db.clone();
        }
        if let Some(interval) = self.check_interval {
            config.database.check_interval_secs = whole_seconds("--check-interval", interval)?;
        }
        if let Some(cluster) = &self.cluster {
            config.service.cluster = cluster.clone();
        }
        if let Some(endpoint) = &self.consul {
            config.consul.endpoint = endpoint.clone();
        }
        if let Some(resync) = self.consul_resync {
            config.consul.resync_interval_secs = whole_seconds("--consul-resync", resync)?;
        }
        if let Some(token) = &self.consul_token {
            config.consul.token = Some(token.clone());
        }
        if let Some(format) = self.log_format {
            config.logging.format = format.into();
        }
        Ok(())
    }
}

/// Intervals are stored in whole seconds; anything finer is an error
/// rather than silently truncated.
fn whole_seconds(flag: &str, duration: Duration) -> Result<u64> {
    if duration.subsec_nanos() != 0 {
        anyhow::bail!(
            "{} must be a whole number of seconds, got {}",
            flag,
            humantime::format_duration(duration)
        );
    }
    Ok(duration.as_secs())
}
