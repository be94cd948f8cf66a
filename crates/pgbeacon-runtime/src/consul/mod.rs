//! Consul agent HTTP API client.

mod client;
mod payload;

pub use client::ConsulClient;
pub use payload::{go_duration, AgentCheck, AgentServiceRegistration};
