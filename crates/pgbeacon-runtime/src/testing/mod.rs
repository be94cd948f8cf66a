//! Test doubles for the pipeline seams.
//!
//! Both doubles are cheap to clone and share their recorded state, so a test
//! can keep a handle after moving the double into a task.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use pgbeacon_core::error::{BeaconError, Result};
use pgbeacon_core::service::ServiceDescriptor;
use pgbeacon_core::traits::{BoxFuture, RoleProbe, ServiceRegistry};

/// One scripted probe answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Primary,
    Replica,
    Lost,
}

/// Role probe that replays a script. The last outcome repeats once the
/// script is exhausted.
#[derive(Debug, Clone)]
pub struct ScriptedProbe {
    script: Arc<Mutex<VecDeque<ProbeOutcome>>>,
    probes: Arc<AtomicUsize>,
    reconnects: Arc<AtomicUsize>,
    reconnect_succeeds: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

impl ScriptedProbe {
    pub fn new(script: impl IntoIterator<Item = ProbeOutcome>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into_iter().collect())),
            probes: Arc::new(AtomicUsize::new(0)),
            reconnects: Arc::new(AtomicUsize::new(0)),
            reconnect_succeeds: Arc::new(AtomicBool::new(true)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Make subsequent reconnect attempts fail.
    pub fn fail_reconnects(&self) {
        self.reconnect_succeeds.store(false, Ordering::SeqCst);
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn reconnect_count(&self) -> usize {
        self.reconnects.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn next_outcome(&self) -> ProbeOutcome {
        let mut script = lock(&self.script);
        if script.len() > 1 {
            script.pop_front().unwrap_or(ProbeOutcome::Lost)
        } else {
            script.front().copied().unwrap_or(ProbeOutcome::Lost)
        }
    }
}

impl RoleProbe for ScriptedProbe {
    fn probe_role(&mut self) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            self.probes.fetch_add(1, Ordering::SeqCst);
            match self.next_outcome() {
                ProbeOutcome::Primary => Ok(true),
                ProbeOutcome::Replica => Ok(false),
                ProbeOutcome::Lost => Err(BeaconError::ConnectionLost("scripted".to_string())),
            }
        })
    }

    fn reconnect(&mut self) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            self.reconnects.fetch_add(1, Ordering::SeqCst);
            self.reconnect_succeeds.load(Ordering::SeqCst)
        })
    }

    fn close(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.closed.store(true, Ordering::SeqCst);
        })
    }
}

/// A registry call, as recorded by [`RecordingRegistry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryCall {
    NodeName,
    Upsert { id: String, tags: Vec<String> },
    EnableMaintenance { id: String, reason: String },
    DisableMaintenance { id: String },
}

/// Registry that records every call in order.
#[derive(Debug, Clone)]
pub struct RecordingRegistry {
    node_name: Option<String>,
    calls: Arc<Mutex<Vec<RegistryCall>>>,
    fail_upserts: Arc<AtomicBool>,
    fail_maintenance: Arc<AtomicBool>,
}

impl RecordingRegistry {
    /// A registry whose agent reports `node_name`.
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: Some(node_name.into()),
            calls: Arc::new(Mutex::new(Vec::new())),
            fail_upserts: Arc::new(AtomicBool::new(false)),
            fail_maintenance: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A registry whose agent cannot report a node name.
    pub fn without_node_name() -> Self {
        Self {
            node_name: None,
            ..Self::new("")
        }
    }

    /// Make upserts fail (or succeed again).
    pub fn set_fail_upserts(&self, fail: bool) {
        self.fail_upserts.store(fail, Ordering::SeqCst);
    }

    /// Make maintenance toggles fail (or succeed again). Failed toggles
    /// are still recorded.
    pub fn set_fail_maintenance(&self, fail: bool) {
        self.fail_maintenance.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<RegistryCall> {
        lock(&self.calls).clone()
    }

    /// Tag sets of every upsert, in order.
    pub fn upserted_tags(&self) -> Vec<Vec<String>> {
        lock(&self.calls)
            .iter()
            .filter_map(|call| match call {
                RegistryCall::Upsert { tags, .. } => Some(tags.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of calls that enabled maintenance mode.
    pub fn maintenance_enabled_count(&self) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|call| matches!(call, RegistryCall::EnableMaintenance { .. }))
            .count()
    }

    fn record(&self, call: RegistryCall) {
        lock(&self.calls).push(call);
    }

    fn maintenance_result(&self) -> Result<()> {
        if self.fail_maintenance.load(Ordering::SeqCst) {
            return Err(BeaconError::RegistryPushFailed("scripted".to_string()));
        }
        Ok(())
    }
}

impl ServiceRegistry for RecordingRegistry {
    fn agent_node_name(&self) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            self.record(RegistryCall::NodeName);
            self.node_name
                .clone()
                .ok_or_else(|| BeaconError::Registry("agent unreachable".to_string()))
        })
    }

    fn upsert_service<'a>(&'a self, service: &'a ServiceDescriptor) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.record(RegistryCall::Upsert {
                id: service.id().to_string(),
                tags: service.tags().to_vec(),
            });
            if self.fail_upserts.load(Ordering::SeqCst) {
                return Err(BeaconError::RegistryPushFailed("scripted".to_string()));
            }
            Ok(())
        })
    }

    fn enable_maintenance<'a>(
        &'a self,
        service_id: &'a str,
        reason: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.record(RegistryCall::EnableMaintenance {
                id: service_id.to_string(),
                reason: reason.to_string(),
            });
            self.maintenance_result()
        })
    }

    fn disable_maintenance<'a>(&'a self, service_id: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.record(RegistryCall::DisableMaintenance {
                id: service_id.to_string(),
            });
            self.maintenance_result()
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
