mod connection;
mod env;
mod params;

pub use connection::{PgConnectionHandle, ROLE_QUERY};
pub use env::PgEnvironment;
pub use params::ConnectionParams;

/// Serializes tests that modify the process environment.
#[cfg(test)]
pub(crate) static PROCESS_ENV: std::sync::Mutex<()> = std::sync::Mutex::new(());
