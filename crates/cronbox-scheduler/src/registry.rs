use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Result, ScheduleError};
use crate::spec::Trigger;

/// Opaque identifier for one live trigger registration.
pub type TriggerHandle = Uuid;

/// The future produced by one callback invocation.
pub type JobFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// A fire-event consumer bound to a trigger.
///
/// The scheduler invokes this on every fire and awaits the returned future;
/// what happens inside (process execution, recording) is entirely the
/// caller's business — this crate has no store or I/O knowledge.
pub type JobCallback = Arc<dyn Fn() -> JobFuture + Send + Sync + 'static>;

struct JobEntry {
    cancel_tx: watch::Sender<bool>,
}

/// Process-wide registry of live triggers.
///
/// An explicit injected instance, never a singleton: tests construct a fresh
/// scheduler per run. Each registration gets its own Tokio timer task, so
/// independent triggers fire concurrently; a single registration never
/// overlaps itself because its timer task awaits the callback before
/// sleeping toward the next fire.
pub struct JobScheduler {
    jobs: Mutex<HashMap<TriggerHandle, JobEntry>>,
    running_tx: watch::Sender<bool>,
    stopped: AtomicBool,
    in_flight: Arc<AtomicUsize>,
}

impl JobScheduler {
    /// Create a scheduler with no registrations, not yet started.
    pub fn new() -> Self {
        let (running_tx, _) = watch::channel(false);
        Self {
            jobs: Mutex::new(HashMap::new()),
            running_tx,
            stopped: AtomicBool::new(false),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Bind `callback` to `trigger` and return the registration handle.
    ///
    /// Costs no more than trigger construction: the timer task is spawned
    /// detached and parks until [`start`](Self::start). Fails only when the
    /// scheduler has already been shut down.
    pub fn register(&self, trigger: Trigger, callback: JobCallback) -> Result<TriggerHandle> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(ScheduleError::SchedulerStopped);
        }

        let handle = Uuid::new_v4();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let running_rx = self.running_tx.subscribe();
        let in_flight = Arc::clone(&self.in_flight);

        tokio::spawn(run_trigger(
            handle, trigger, callback, running_rx, cancel_rx, in_flight,
        ));

        self.jobs
            .lock()
            .unwrap()
            .insert(handle, JobEntry { cancel_tx });
        info!(handle = %handle, "trigger registered");
        Ok(handle)
    }

    /// Remove a registration. Idempotent: an unknown or already-removed
    /// handle returns `false` and is not an error.
    ///
    /// A callback invocation already in flight for this handle runs to
    /// completion; only future fires are cancelled.
    pub fn unregister(&self, handle: TriggerHandle) -> bool {
        match self.jobs.lock().unwrap().remove(&handle) {
            Some(entry) => {
                let _ = entry.cancel_tx.send(true);
                info!(handle = %handle, "trigger unregistered");
                true
            }
            None => {
                debug!(handle = %handle, "unregister: unknown trigger handle");
                false
            }
        }
    }

    /// Begin firing. Registrations made before this call start their timers
    /// now; registrations made after fire as they come.
    pub fn start(&self) {
        self.running_tx.send_replace(true);
        info!("job scheduler started");
    }

    /// Cease firing and wait up to `timeout` for in-flight callback
    /// invocations to finish, then return regardless.
    ///
    /// Sleeping timer tasks exit immediately; a callback still executing
    /// past the deadline is abandoned (its process keeps running, but the
    /// scheduler no longer tracks it). The scheduler accepts no new
    /// registrations afterwards.
    pub async fn stop(&self, timeout: Duration) {
        self.stopped.store(true, Ordering::SeqCst);
        self.running_tx.send_replace(false);

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let in_flight = self.in_flight.load(Ordering::SeqCst);
            if in_flight == 0 {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                warn!(in_flight, "scheduler stop timed out; abandoning in-flight jobs");
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        info!("job scheduler stopped");
    }

    /// Whether `handle` is currently in the registration map.
    ///
    /// A one-shot trigger that already fired is retired from the active set
    /// but stays registered until [`unregister`](Self::unregister).
    pub fn is_registered(&self, handle: TriggerHandle) -> bool {
        self.jobs.lock().unwrap().contains_key(&handle)
    }

    pub fn registered_count(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }
}

impl Default for JobScheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Timer loop for one registration.
///
/// Parks until the scheduler starts, then alternates sleep → fire. The
/// callback is awaited in-line, which is what serializes re-fires of the
/// same handle behind the prior invocation; the *instant* of the next fire
/// is still computed from the schedule, independent of execution time.
async fn run_trigger(
    handle: TriggerHandle,
    trigger: Trigger,
    callback: JobCallback,
    mut running_rx: watch::Receiver<bool>,
    mut cancel_rx: watch::Receiver<bool>,
    in_flight: Arc<AtomicUsize>,
) {
    // Park until start(). Cancellation while parked retires the task.
    while !*running_rx.borrow() {
        tokio::select! {
            changed = running_rx.changed() => {
                if changed.is_err() {
                    return;
                }
            }
            changed = cancel_rx.changed() => {
                if changed.is_err() || *cancel_rx.borrow() {
                    return;
                }
            }
        }
    }

    let Some(mut next) = trigger.first_fire(Utc::now()) else {
        // One-shot whose instant already passed: fires not at all.
        debug!(handle = %handle, "trigger has no upcoming fire; retiring");
        return;
    };

    loop {
        let now = Utc::now();
        let delay = (next - now).to_std().unwrap_or(Duration::ZERO);

        let fired = tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            changed = cancel_rx.changed() => {
                if changed.is_err() || *cancel_rx.borrow() {
                    debug!(handle = %handle, "trigger cancelled");
                    return;
                }
                false
            }
            changed = running_rx.changed() => {
                if changed.is_err() || !*running_rx.borrow() {
                    debug!(handle = %handle, "scheduler stopped; trigger retiring");
                    return;
                }
                false
            }
        };
        if !fired {
            continue;
        }

        in_flight.fetch_add(1, Ordering::SeqCst);
        callback().await;
        in_flight.fetch_sub(1, Ordering::SeqCst);

        match trigger.next_fire(next, Utc::now()) {
            Some(instant) => next = instant,
            None => {
                // One-shot: fired exactly once, implicitly retired. The map
                // entry survives until the owner calls unregister.
                debug!(handle = %handle, "one-shot trigger retired after firing");
                return;
            }
        }
    }
}
