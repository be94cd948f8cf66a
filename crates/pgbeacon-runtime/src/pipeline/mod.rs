//! The monitor → registrar pipeline.
//!
//! `RoleMonitor` polls the database and hands every observation to
//! `ServiceRegistrar` over a rendezvous channel; the registrar turns changes
//! into registry writes and re-asserts the current state on a timer.
//! Both tasks stop on the coordinator's cancellation token.

mod channel;
mod monitor;
mod registrar;
mod shutdown;
mod timer;

pub use channel::{state_channel, ChannelClosed, StateReceiver, StateSender};
pub use monitor::{MonitorConfig, RoleMonitor};
pub use registrar::{RegistrarConfig, ServiceRegistrar, MAINTENANCE_REASON};
pub use shutdown::ShutdownCoordinator;
pub use timer::RenewalTimer;
