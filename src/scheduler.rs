//! Single-run guard and the periodic ingestion scheduler.
//!
//! [`RunGuard`] is a non-blocking flag: [`RunGuard::try_acquire`] either hands
//! out the only [`RunPermit`] or returns `None` immediately. Dropping the
//! permit releases the guard, also when the run panicked.
//!
//! The [`Scheduler`] fires one ingestion run at startup and then one per
//! interval. A tick that finds a run in progress is skipped, never queued.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::engine::Engine;

#[derive(Clone, Default)]
pub struct RunGuard {
    running: Arc<AtomicBool>,
}

impl RunGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self) -> Option<RunPermit> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunPermit {
                running: self.running.clone(),
            })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Proof of holding the guard.
pub struct RunPermit {
    running: Arc<AtomicBool>,
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Answer to a fire-and-forget trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Triggered {
    Started,
    /// Another job holds the guard; nothing was started.
    Busy,
}

pub struct Scheduler {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Scheduler {
    /// Starts with the period from `[ingress].interval_minutes`.
    pub fn start(engine: Arc<Engine>) -> Self {
        let minutes = engine.config().ingress.interval_minutes;
        Self::with_period(engine, Duration::from_secs(minutes * 60))
    }

    pub fn with_period(engine: Arc<Engine>, period: Duration) -> Self {
        let (shutdown, mut stop) = watch::channel(false);

        let handle = tokio::spawn(async move {
            info!(period_secs = period.as_secs(), "scheduler started");

            // startup run, concurrent with arming the timer
            log_trigger(engine.trigger_ingestion(), "startup");

            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => log_trigger(engine.trigger_ingestion(), "interval"),
                    // a sent stop signal and a dropped sender both end the loop
                    _ = stop.changed() => break,
                }
            }
            info!("scheduler stopped");
        });

        Self { shutdown, handle }
    }

    /// Stops the timer. A run already in flight finishes on its own.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}

fn log_trigger(result: Triggered, source: &str) {
    match result {
        Triggered::Started => debug!(source, "ingestion run started"),
        Triggered::Busy => debug!(source, "ingestion already running, tick skipped"),
    }
}
