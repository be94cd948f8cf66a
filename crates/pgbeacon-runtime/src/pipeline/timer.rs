use std::future::pending;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::{sleep_until, Instant, Sleep};

/// Resettable one-shot timer driving the registrar's resync.
///
/// Firing is a deadline, not a queued notification: once `stop` returns,
/// an expiry that happened before the stop can never be observed, so a
/// later `reset` always waits the full period.
#[derive(Debug)]
pub struct RenewalTimer {
    period: Duration,
    sleep: Pin<Box<Sleep>>,
    armed: bool,
}

impl RenewalTimer {
    /// Create a timer armed to fire one `period` from now.
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            sleep: Box::pin(sleep_until(Instant::now() + period)),
            armed: true,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Disarm the timer, discarding an expiry that has not been consumed.
    ///
    /// Returns true if the timer was still pending, false if it had already
    /// fired or been stopped.
    pub fn stop(&mut self) -> bool {
        let was_pending = self.armed && !self.sleep.is_elapsed();
        self.armed = false;
        was_pending
    }

    /// Re-arm the timer to fire one full period from now.
    pub fn reset(&mut self) {
        self.sleep.as_mut().reset(Instant::now() + self.period);
        self.armed = true;
    }

    /// Wait for the timer to fire. Never completes while disarmed.
    ///
    /// Cancel safe; the timer disarms itself when this completes.
    pub async fn fired(&mut self) {
        if !self.armed {
            pending::<()>().await;
        }
        self.sleep.as_mut().await;
        self.armed = false;
    }
}
