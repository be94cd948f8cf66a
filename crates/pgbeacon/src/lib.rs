//! pgbeacon - publish the replication role of the local PostgreSQL node
//! to a Consul agent.
//!
//! A role monitor polls the database and hands each observed state to a
//! service registrar, which updates the Consul service tags and maintenance
//! mode whenever the role changes and re-asserts the registration
//! periodically otherwise.

mod runtime;

pub use runtime::{Beacon, BeaconBuilder, EnvLookup};
