//! Core types for pgbeacon.
//!
//! Everything in this crate is free of I/O: the role model, the registry
//! service descriptor, the error taxonomy, configuration, and the traits
//! that the runtime implements for PostgreSQL and Consul.

pub mod config;
pub mod error;
pub mod role;
pub mod service;
pub mod traits;

pub use config::BeaconConfig;
pub use error::{BeaconError, Result};
pub use role::RoleState;
pub use service::{HealthCheck, ServiceDescriptor, SERVICE_KIND};
pub use traits::{BoxFuture, RoleProbe, ServiceRegistry};
