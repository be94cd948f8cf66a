use tokio::sync::{mpsc, oneshot};

use pgbeacon_core::RoleState;

/// The other side of the channel has gone away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("state channel closed")]
pub struct ChannelClosed;

struct Handoff {
    state: RoleState,
    taken: oneshot::Sender<()>,
}

/// Create the single-producer, single-consumer hand-off channel.
///
/// A send completes only once the receiver has taken the value, so the
/// producer is never more than one value ahead of the consumer.
pub fn state_channel() -> (StateSender, StateReceiver) {
    let (tx, rx) = mpsc::channel(1);
    (StateSender { tx }, StateReceiver { rx })
}

/// Producing half, owned by the role monitor.
#[derive(Debug)]
pub struct StateSender {
    tx: mpsc::Sender<Handoff>,
}

impl StateSender {
    /// Hand `state` to the receiver, waiting until it has been taken.
    pub async fn send(&self, state: RoleState) -> Result<(), ChannelClosed> {
        let (taken, taken_rx) = oneshot::channel();
        self.tx
            .send(Handoff { state, taken })
            .await
            .map_err(|_| ChannelClosed)?;
        taken_rx.await.map_err(|_| ChannelClosed)
    }
}

/// Consuming half, owned by the service registrar.
#[derive(Debug)]
pub struct StateReceiver {
    rx: mpsc::Receiver<Handoff>,
}

impl StateReceiver {
    /// Take the next value, releasing the waiting sender.
    ///
    /// Cancel safe: a value is only removed from the channel when this
    /// future completes. Values whose send was abandoned are skipped.
    /// Returns `None` once the sender is dropped.
    pub async fn recv(&mut self) -> Option<RoleState> {
        loop {
            let handoff = self.rx.recv().await?;
            if handoff.taken.send(()).is_ok() {
                return Some(handoff.state);
            }
        }
    }
}

impl std::fmt::Debug for Handoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handoff").field("state", &self.state).finish()
    }
}
