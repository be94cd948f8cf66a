use thiserror::Error;

/// Core error type for pgbeacon operations.
#[derive(Error, Debug)]
pub enum BeaconError {
    /// Neither the connection string nor the environment produced usable
    /// connection parameters. Fatal at startup.
    #[error("Invalid connection parameters: {0}")]
    InvalidConnectionParameters(String),

    /// Neither the registry agent nor the local system reported a host name.
    #[error("Could not determine hostname")]
    HostnameUnresolved,

    /// The database did not answer the role probe.
    #[error("Database connection lost: {0}")]
    ConnectionLost(String),

    /// A registry write (upsert or maintenance toggle) failed.
    #[error("Registry push failed: {0}")]
    RegistryPushFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using BeaconError.
pub type Result<T> = std::result::Result<T, BeaconError>;
