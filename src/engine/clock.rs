//! Clock/Timer service.
//!
//! Thin layer over `tokio::time` that gives the engine one logical timeline:
//! `now()` reads the runtime clock (honoring a paused test clock), and
//! `after`/`every` schedule callbacks as spawned tasks. Callbacks scheduled
//! for distinct instants fire in timestamp order; same-instant order is
//! unspecified.
//!
//! Must be used from within a tokio runtime.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Current instant on the engine timeline.
pub fn now() -> Instant {
    Instant::now()
}

/// Handle to a scheduled callback.
///
/// `cancel` is an idempotent no-op once the callback has fired. Dropping the
/// handle detaches the timer rather than cancelling it: scheduled deliveries
/// are fire-and-forget, and must re-check engine state when they fire.
#[derive(Debug)]
pub struct TimerHandle {
    task: JoinHandle<()>,
}

impl TimerHandle {
    /// Cancel the timer. If the callback has not started running it never
    /// will.
    pub fn cancel(&self) {
        self.task.abort();
    }
}

/// Run `f` once after `delay`.
pub fn after<F>(delay: Duration, f: F) -> TimerHandle
where
    F: FnOnce() + Send + 'static,
{
    let task = tokio::spawn(async move {
        time::sleep(delay).await;
        f();
    });
    TimerHandle { task }
}

/// Run `f` every `period`, first firing one period from now.
pub fn every<F>(period: Duration, mut f: F) -> TimerHandle
where
    F: FnMut() + Send + 'static,
{
    let task = tokio::spawn(async move {
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick of a tokio interval completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            f();
        }
    });
    TimerHandle { task }
}
