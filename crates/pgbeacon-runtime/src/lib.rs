//! Runtime for pgbeacon: the PostgreSQL role probe, the Consul client, and
//! the monitor → registrar pipeline that connects them.

pub mod consul;
pub mod db;
pub mod pipeline;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use consul::ConsulClient;
pub use db::{ConnectionParams, PgConnectionHandle, PgEnvironment};
pub use pipeline::{
    state_channel, MonitorConfig, RegistrarConfig, RoleMonitor, ServiceRegistrar,
    ShutdownCoordinator, StateReceiver, StateSender,
};
