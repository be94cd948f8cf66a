use std::future::Future;
use std::pin::Pin;

use crate::error::Result;
use crate::service::ServiceDescriptor;

/// Boxed future returned by the seam traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A database connection that can report whether the node is primary.
///
/// Owned exclusively by the role monitor.
pub trait RoleProbe: Send {
    /// Ask the database for its role. `Ok(true)` means primary.
    ///
    /// Fails with `ConnectionLost` when the connection cannot answer.
    fn probe_role(&mut self) -> BoxFuture<'_, Result<bool>>;

    /// Replace the held connection with a fresh one.
    ///
    /// The previous connection is released first, so a failed attempt leaves
    /// the probe without a connection until a later attempt succeeds.
    fn reconnect(&mut self) -> BoxFuture<'_, bool>;

    /// Release the held connection.
    fn close(&mut self) -> BoxFuture<'_, ()>;
}

/// The service registry the node's role is published to.
pub trait ServiceRegistry: Send + Sync {
    /// Node name as reported by the local registry agent.
    fn agent_node_name(&self) -> BoxFuture<'_, Result<String>>;

    /// Create or replace the service record.
    fn upsert_service<'a>(&'a self, service: &'a ServiceDescriptor) -> BoxFuture<'a, Result<()>>;

    /// Put the service into maintenance mode.
    fn enable_maintenance<'a>(&'a self, service_id: &'a str, reason: &'a str)
        -> BoxFuture<'a, Result<()>>;

    /// Take the service out of maintenance mode. Idempotent.
    fn disable_maintenance<'a>(&'a self, service_id: &'a str) -> BoxFuture<'a, Result<()>>;
}
