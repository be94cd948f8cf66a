use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;

use pgbeacon_core::error::{BeaconError, Result};
use pgbeacon_core::traits::{BoxFuture, RoleProbe};

use super::params::ConnectionParams;

/// Query answering whether the server is replaying WAL, i.e. is a replica.
pub const ROLE_QUERY: &str = "SELECT pg_is_in_recovery()";

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// A single PostgreSQL connection plus what is needed to re-open it.
pub struct PgConnectionHandle {
    conn: Option<PgConnection>,
    options: PgConnectOptions,
    connect_timeout: Duration,
    probe_timeout: Duration,
}

impl PgConnectionHandle {
    /// Open the initial connection. Failing here means the monitor cannot start.
    pub async fn connect(params: &ConnectionParams, probe_timeout: Duration) -> Result<Self> {
        let options = params.to_connect_options()?;
        let connect_timeout = params.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT);

        let conn = open(&options, connect_timeout)
            .await
            .map_err(|e| BeaconError::Database(format!("Could not connect to database: {}", e)))?;

        Ok(Self {
            conn: Some(conn),
            options,
            connect_timeout,
            probe_timeout,
        })
    }

    /// Whether a connection is currently held.
    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    async fn release(&mut self) {
        if let Some(conn) = self.conn.take() {
            if tokio::time::timeout(CLOSE_TIMEOUT, conn.close()).await.is_err() {
                tracing::debug!("Timed out closing database connection, dropping it");
            }
        }
    }
}

impl RoleProbe for PgConnectionHandle {
    fn probe_role(&mut self) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            let probe_timeout = self.probe_timeout;
            let conn = self
                .conn
                .as_mut()
                .ok_or_else(|| BeaconError::ConnectionLost("no open connection".to_string()))?;

            let query = sqlx::query_scalar::<_, bool>(ROLE_QUERY).fetch_optional(&mut *conn);

            match tokio::time::timeout(probe_timeout, query).await {
                Ok(Ok(Some(in_recovery))) => Ok(!in_recovery),
                Ok(Ok(None)) => Err(BeaconError::ConnectionLost(
                    "role query returned no rows".to_string(),
                )),
                Ok(Err(e)) => Err(BeaconError::ConnectionLost(e.to_string())),
                Err(_) => Err(BeaconError::ConnectionLost(format!(
                    "role query timed out after {:?}",
                    probe_timeout
                ))),
            }
        })
    }

    fn reconnect(&mut self) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            self.release().await;

            match open(&self.options, self.connect_timeout).await {
                Ok(conn) => {
                    self.conn = Some(conn);
                    tracing::info!("Reconnected to database");
                    true
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Database reconnect failed");
                    false
                }
            }
        })
    }

    fn close(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(self.release())
    }
}

async fn open(options: &PgConnectOptions, timeout: Duration) -> std::result::Result<PgConnection, String> {
    match tokio::time::timeout(timeout, PgConnection::connect_with(options)).await {
        Ok(Ok(conn)) => Ok(conn),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("timed out after {:?}", timeout)),
    }
}
