use anyhow::Result;
use pgbeacon_core::config::{LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
pub fn init(config: &LoggingConfig, debug: bool) -> Result<()> {
    let directive = filter_directive(config, debug, std::env::var("RUST_LOG").ok());
    let filter = EnvFilter::try_new(&directive)
        .map_err(|e| anyhow::anyhow!("Invalid log filter '{}': {}", directive, e))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = match config.format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    installed.map_err(|e| anyhow::anyhow!("Failed to install log subscriber: {}", e))
}

/// `RUST_LOG` wins, then `--debug`, then the configured level.
fn filter_directive(config: &LoggingConfig, debug: bool, rust_log: Option<String>) -> String {
    match rust_log {
        Some(directive) if !directive.trim().is_empty() => directive,
        _ if debug => "debug".to_string(),
        _ => config.level.clone(),
    }
}
