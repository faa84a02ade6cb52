//! Cancellable timers that post events into the session loop.
//!
//! A [`ScheduledTask`] is owned by the component that created it. Dropping or
//! cancelling it aborts the underlying tokio task, so a superseded timer can
//! never fire into a reset session.

use crate::event::{EventSender, SessionEvent};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

#[derive(Debug)]
pub struct ScheduledTask {
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// Post `event` once after `delay`.
    pub fn after(delay: Duration, events: EventSender, event: SessionEvent) -> Self {
        let deadline = Instant::now() + delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if events.send(event).is_err() {
                tracing::trace!("timer fired after session loop stopped");
            }
        });
        Self { handle }
    }

    /// Post an event built by `make` every `period`, first one `period` from now.
    pub fn every<F>(period: Duration, events: EventSender, make: F) -> Self
    where
        F: Fn() -> SessionEvent + Send + 'static,
    {
        let first = Instant::now() + period;
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(first, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
            loop {
                interval.tick().await;
                if events.send(make()).is_err() {
                    break;
                }
            }
        });
        Self { handle }
    }

    /// Stop the timer. Events it already queued are rejected by their token.
    pub fn cancel(self) {
        drop(self);
    }

    /// True once a one-shot timer has fired (or the task was aborted).
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
