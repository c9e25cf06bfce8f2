//! Priority event scheduler engine.
//!
//! [`EventScheduler`] accepts one-shot and recurring timed actions from any
//! number of producer threads and dispatches them at their due time with
//! deterministic tie-breaking.  One dedicated worker thread owns the loop;
//! producers only ever touch the shared state under the engine mutex.
//!
//! # Design decisions
//!
//! | Topic | Choice |
//! |---|---|
//! | Shared state | one `Mutex<Core>` + one `Condvar`; the heap, the recurring registry and the armed sleep deadline never leave the guarded region |
//! | Ordering | min-heap over `(due, priority, seq)`; submission order is a hard guarantee within equal `(due, priority)` |
//! | Sleeping | `Condvar::wait_timeout` until the next due time; the deadline lives inside the guarded state, so arming can never race with queue mutation |
//! | Recurring cadence | next due = previous due + interval, re-inserted by the worker before dispatch; a slow action cannot shift the schedule |
//! | Shutdown | `stop()` queues a reserved-maximum-priority marker that sorts after all queued work, then joins the worker |
//! | Action failures | per-event panic boundary in every dispatch mode; the worker never dies with the queue |
//!
//! # Example
//! ```rust,ignore
//! let scheduler = EventScheduler::with_defaults();
//! scheduler.start()?;
//! scheduler.enter_after(Duration::from_secs(30), DEFAULT_PRIORITY, || poll_reactor())?;
//! scheduler.enter_recurring(Duration::from_secs(5), DEFAULT_PRIORITY, || read_temperature())?;
//! scheduler.stop(StopMode::Drain)?;
//! ```

pub mod error;
pub(crate) mod queue;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;

use tracing::{debug, error, info, warn};

use crate::clock::{Clock, MonotonicClock, Time};
use crate::config::SchedulerConfig;
use crate::dispatch::Dispatcher;
use crate::event::{
    Action, EventHandle, EventInfo, Priority, RecurringHandle, ScheduledEvent, SHUTDOWN_PRIORITY,
};
use error::SchedulerError;
use queue::EventQueue;

// ── Lifecycle types ───────────────────────────────────────────────────────────

/// Engine lifecycle state.
///
/// Transitions: `Stopped → Running` (`start`), `Running → Stopping` (`stop`),
/// `Stopping → Stopped` (worker exited).  Submission and cancellation
/// operations require `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running,
    Stopping,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerState::Stopped => write!(f, "stopped"),
            SchedulerState::Running => write!(f, "running"),
            SchedulerState::Stopping => write!(f, "stopping"),
        }
    }
}

/// What [`stop`](EventScheduler::stop) does with work still in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMode {
    /// Keep the queue: the worker fires everything due at or before the
    /// shutdown marker before exiting.  With recurring registrations still
    /// active this can take until their occurrences pass the marker's due
    /// time.
    Drain,
    /// Discard all pending work first; the worker exits at the next loop
    /// iteration without firing anything further.
    Discard,
}

// ── Mutex-protected state ─────────────────────────────────────────────────────

/// Interval + live-instance bookkeeping for one recurring registration.
///
/// Invariant: while an id is present in the registry, exactly one queued
/// event carries that id, and `live_seq` is its sequence number.  Both sides
/// are always updated under the same mutex guard.
struct RecurringEntry {
    interval: Time,
    live_seq: u64,
}

/// Everything the engine mutex protects.  The heap, the registry and the
/// armed sleep deadline are never read or written outside the guard.
struct Core {
    state: SchedulerState,
    queue: EventQueue,
    recurring: HashMap<u64, RecurringEntry>,
    /// Deadline of the worker's current timed sleep, if any.  Keeping it in
    /// here means arming and disarming are ordinary guarded mutations; a
    /// stale sleep racing a newer, earlier one cannot happen.
    armed_until: Option<Time>,
    next_seq: u64,
    next_recurring_id: u64,
}

impl Core {
    fn new() -> Self {
        Self {
            state: SchedulerState::Stopped,
            queue: EventQueue::new(),
            recurring: HashMap::new(),
            armed_until: None,
            next_seq: 0,
            next_recurring_id: 0,
        }
    }

    fn take_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn take_recurring_id(&mut self) -> u64 {
        self.next_recurring_id += 1;
        self.next_recurring_id
    }

    /// True when the worker's current sleep (or indefinite wait) would
    /// outlast `due`, i.e. the worker needs a nudge to observe an event due
    /// at that instant on time.
    fn sleep_outlasts(&self, due: Time) -> bool {
        match self.armed_until {
            Some(armed) => due < armed,
            None => true,
        }
    }
}

struct Shared {
    core: Mutex<Core>,
    /// Sole suspension point of the worker; producers and the clock waker
    /// notify it when the worker's current sleep became too long.
    wakeup: Condvar,
}

impl Shared {
    fn lock_core(&self) -> MutexGuard<'_, Core> {
        // No user code ever runs under this lock (actions are dispatched
        // outside it), so a poisoned guard can only mean an internal bug in a
        // guarded region; the state itself is still consistent.
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── EventScheduler ────────────────────────────────────────────────────────────

/// Thread-safe, priority-ordered event scheduler.
///
/// Owns the event queue, the recurring registry and one dedicated worker
/// thread.  All methods take `&self`; share the engine across producer
/// threads behind an `Arc`.
pub struct EventScheduler {
    shared: Arc<Shared>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl EventScheduler {
    /// Build an engine from explicit configuration and clock.
    ///
    /// The clock's waker hook is registered here, so a discontinuous clock
    /// (test clock) can interrupt the worker's timed sleep on every jump.
    pub fn new(config: SchedulerConfig, clock: Arc<dyn Clock>) -> Self {
        let shared = Arc::new(Shared {
            core: Mutex::new(Core::new()),
            wakeup: Condvar::new(),
        });

        let hook_shared = shared.clone();
        clock.register_waker(Arc::new(move || {
            // Taking the lock orders this notification after any in-progress
            // "check due time, then wait" step of the worker.
            let _core = hook_shared.lock_core();
            hook_shared.wakeup.notify_all();
        }));

        Self {
            shared,
            clock,
            config,
            worker: Mutex::new(None),
        }
    }

    /// Default configuration (serialized dispatch) on a [`MonotonicClock`].
    pub fn with_defaults() -> Self {
        Self::new(SchedulerConfig::default(), Arc::new(MonotonicClock::new()))
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SchedulerState {
        self.shared.lock_core().state
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Spawn the worker thread and transition to `Running`.
    ///
    /// # Errors
    /// [`SchedulerError::AlreadyStarted`] unless the engine is `Stopped`;
    /// [`SchedulerError::WorkerSpawn`] if the OS refuses the thread (the
    /// engine rolls back to `Stopped`).
    pub fn start(&self) -> Result<(), SchedulerError> {
        let mut core = self.shared.lock_core();
        if core.state != SchedulerState::Stopped {
            return Err(SchedulerError::AlreadyStarted { state: core.state });
        }
        core.state = SchedulerState::Running;
        drop(core);

        let shared = self.shared.clone();
        let clock = self.clock.clone();
        let dispatcher = Dispatcher::build(self.config.dispatch, &self.config.name);
        let name = self.config.name.clone();

        let spawned = thread::Builder::new()
            .name(format!("{}-worker", self.config.name))
            .spawn(move || worker_loop(shared, clock, dispatcher, name));

        match spawned {
            Ok(handle) => {
                *self.lock_worker() = Some(handle);
                info!(
                    scheduler = %self.config.name,
                    dispatch = ?self.config.dispatch,
                    "scheduler started"
                );
                Ok(())
            }
            Err(e) => {
                self.shared.lock_core().state = SchedulerState::Stopped;
                error!(scheduler = %self.config.name, error = %e, "failed to spawn worker");
                Err(SchedulerError::WorkerSpawn {
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Queue the shutdown marker, block until the worker has exited, then
    /// transition to `Stopped`.
    ///
    /// The marker's due time is the latest queued due time (or the current
    /// clock reading when the queue is empty) and its priority is the
    /// reserved maximum, so under [`StopMode::Drain`] every event due at or
    /// before it fires first.  [`StopMode::Discard`] clears the queue, the
    /// recurring registry and the armed sleep before queueing the marker, so
    /// nothing further fires.
    ///
    /// Actions already handed to a concurrent or pool dispatcher cannot be
    /// aborted mid-flight; a draining stop joins pool workers, a discard stop
    /// leaves detached per-event threads to finish on their own.
    ///
    /// # Errors
    /// [`SchedulerError::NotRunning`] unless the engine is `Running`.
    pub fn stop(&self, mode: StopMode) -> Result<(), SchedulerError> {
        let mut core = self.shared.lock_core();
        if core.state != SchedulerState::Running {
            return Err(SchedulerError::NotRunning { state: core.state });
        }

        if mode == StopMode::Discard {
            let dropped = core.queue.len();
            core.queue.clear();
            core.recurring.clear();
            core.armed_until = None;
            if dropped > 0 {
                debug!(dropped, "discarded pending events");
            }
        }

        let due = core
            .queue
            .latest_due()
            .unwrap_or_else(|| self.clock.now());
        let seq = core.take_seq();
        core.queue.push(ScheduledEvent::shutdown_marker(seq, due));
        core.state = SchedulerState::Stopping;
        info!(
            scheduler = %self.config.name,
            mode = ?mode,
            marker_due_us = due.as_micros() as u64,
            "stop requested"
        );
        self.shared.wakeup.notify_all();
        drop(core);

        if let Some(handle) = self.lock_worker().take() {
            if handle.join().is_err() {
                error!(scheduler = %self.config.name, "worker thread panicked during shutdown");
            }
        }

        let mut core = self.shared.lock_core();
        core.state = SchedulerState::Stopped;
        core.armed_until = None;
        drop(core);
        info!(scheduler = %self.config.name, "scheduler stopped");
        Ok(())
    }

    // ── Submission ────────────────────────────────────────────────────────────

    /// Schedule `action` to fire at the absolute instant `due` on the
    /// engine's clock.  A due time already in the past fires as soon as the
    /// worker gets to it.
    ///
    /// # Errors
    /// [`SchedulerError::InvalidPriority`] if `priority` is reserved;
    /// [`SchedulerError::NotRunning`] unless the engine is `Running`.
    pub fn enter_at(
        &self,
        due: Time,
        priority: Priority,
        action: impl Fn() + Send + Sync + 'static,
    ) -> Result<EventHandle, SchedulerError> {
        self.submit_one_shot(due, priority, Arc::new(action))
    }

    /// Schedule `action` to fire `delay` from now (`clock.now() + delay`).
    pub fn enter_after(
        &self,
        delay: Time,
        priority: Priority,
        action: impl Fn() + Send + Sync + 'static,
    ) -> Result<EventHandle, SchedulerError> {
        self.submit_one_shot(self.clock.now() + delay, priority, Arc::new(action))
    }

    /// Register `action` to fire every `interval`, first at
    /// `clock.now() + interval`.
    ///
    /// The cadence is anchored to the schedule, not to dispatch times: each
    /// occurrence is due exactly one interval after the previous one was
    /// *due*, so a delayed firing does not shift subsequent firings.
    ///
    /// # Errors
    /// [`SchedulerError::InvalidInterval`] for a zero interval;
    /// [`SchedulerError::InvalidPriority`] / [`SchedulerError::NotRunning`]
    /// as for [`enter_at`](Self::enter_at).
    pub fn enter_recurring(
        &self,
        interval: Time,
        priority: Priority,
        action: impl Fn() + Send + Sync + 'static,
    ) -> Result<RecurringHandle, SchedulerError> {
        validate_priority(priority)?;
        if interval.is_zero() {
            return Err(SchedulerError::InvalidInterval);
        }

        let mut core = self.shared.lock_core();
        ensure_running(&core)?;

        let id = core.take_recurring_id();
        let seq = core.take_seq();
        let due = self.clock.now() + interval;
        let event = ScheduledEvent::recurring(seq, due, priority, id, Arc::new(action));
        core.recurring.insert(
            id,
            RecurringEntry {
                interval,
                live_seq: seq,
            },
        );
        self.insert(&mut core, event);
        debug!(
            recurring_id = id,
            interval_us = interval.as_micros() as u64,
            "recurring event registered"
        );
        Ok(RecurringHandle(id))
    }

    fn submit_one_shot(
        &self,
        due: Time,
        priority: Priority,
        action: Action,
    ) -> Result<EventHandle, SchedulerError> {
        validate_priority(priority)?;
        let mut core = self.shared.lock_core();
        ensure_running(&core)?;

        let seq = core.take_seq();
        let event = ScheduledEvent::one_shot(seq, due, priority, action);
        self.insert(&mut core, event);
        Ok(EventHandle(seq))
    }

    /// Push under the held guard and nudge the worker if its current sleep
    /// would overshoot the new queue minimum.
    fn insert(&self, core: &mut Core, event: ScheduledEvent) {
        let due = event.due();
        let new_minimum = core.queue.peek().map_or(true, |head| event < *head);
        core.queue.push(event);
        debug!(
            due_us = due.as_micros() as u64,
            queued = core.queue.len(),
            "event queued"
        );
        if new_minimum && core.sleep_outlasts(due) {
            self.shared.wakeup.notify_all();
        }
    }

    // ── Cancellation ──────────────────────────────────────────────────────────

    /// Cancel a one-shot event.
    ///
    /// Best-effort and race-tolerant: if the event already fired, was already
    /// cancelled, or is being popped by the worker right now, this is a
    /// successful no-op.
    ///
    /// # Errors
    /// [`SchedulerError::NotRunning`] unless the engine is `Running`.
    pub fn cancel(&self, handle: EventHandle) -> Result<(), SchedulerError> {
        let mut core = self.shared.lock_core();
        ensure_running(&core)?;

        let was_minimum = core
            .queue
            .peek()
            .map_or(false, |head| head.seq() == handle.0);
        if core.queue.remove_seq(handle.0) {
            debug!(seq = handle.0, "event canceled");
            if was_minimum {
                // The worker may be sleeping toward the removed deadline.
                self.shared.wakeup.notify_all();
            }
        }
        Ok(())
    }

    /// Cancel a recurring registration: removes the registry entry and the
    /// queued occurrence under one guard, so no further firings occur.
    ///
    /// An occurrence the worker already popped still runs; in-flight
    /// dispatch cannot be aborted.
    ///
    /// # Errors
    /// [`SchedulerError::NotRunning`] unless the engine is `Running`.
    pub fn cancel_recurring(&self, handle: RecurringHandle) -> Result<(), SchedulerError> {
        let mut core = self.shared.lock_core();
        ensure_running(&core)?;

        if let Some(entry) = core.recurring.remove(&handle.0) {
            let was_minimum = core
                .queue
                .peek()
                .map_or(false, |head| head.seq() == entry.live_seq);
            core.queue.remove_seq(entry.live_seq);
            debug!(recurring_id = handle.0, "recurring event canceled");
            if was_minimum {
                self.shared.wakeup.notify_all();
            }
        }
        Ok(())
    }

    /// Discard every pending event and recurring registration, and cancel the
    /// worker's armed sleep.  The engine stays `Running`.
    ///
    /// # Errors
    /// [`SchedulerError::NotRunning`] unless the engine is `Running`.
    pub fn cancel_all(&self) -> Result<(), SchedulerError> {
        let mut core = self.shared.lock_core();
        ensure_running(&core)?;

        let dropped = core.queue.len();
        core.queue.clear();
        core.recurring.clear();
        core.armed_until = None;
        self.shared.wakeup.notify_all();
        debug!(dropped, "all pending events canceled");
        Ok(())
    }

    // ── Inspection ────────────────────────────────────────────────────────────

    /// Point-in-time, dispatch-ordered copy of the pending queue.
    ///
    /// Intended for inspection and tests; the live queue is not disturbed.
    pub fn snapshot(&self) -> Vec<EventInfo> {
        self.shared.lock_core().queue.snapshot()
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<thread::JoinHandle<()>>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for EventScheduler {
    fn drop(&mut self) {
        if self.state() == SchedulerState::Running {
            warn!(
                scheduler = %self.config.name,
                "scheduler dropped while running; discarding pending work"
            );
            let _ = self.stop(StopMode::Discard);
        }
    }
}

impl fmt::Debug for EventScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventScheduler")
            .field("name", &self.config.name)
            .field("dispatch", &self.config.dispatch)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ── Validation helpers ────────────────────────────────────────────────────────

fn validate_priority(priority: Priority) -> Result<(), SchedulerError> {
    if priority >= SHUTDOWN_PRIORITY {
        return Err(SchedulerError::InvalidPriority { priority });
    }
    Ok(())
}

fn ensure_running(core: &Core) -> Result<(), SchedulerError> {
    if core.state != SchedulerState::Running {
        return Err(SchedulerError::NotRunning { state: core.state });
    }
    Ok(())
}

// ── Worker loop ───────────────────────────────────────────────────────────────

/// The dedicated worker: sleeps until the next due time, pops and dispatches
/// due events, reschedules recurring ones, and exits when the shutdown
/// marker reaches the head of the queue.
///
/// The worker is the only thread that ever waits on the condvar; producers
/// synchronize with shutdown through `stop()`'s join, not the condvar.
fn worker_loop(shared: Arc<Shared>, clock: Arc<dyn Clock>, dispatcher: Dispatcher, name: String) {
    debug!(scheduler = %name, "worker loop entered");

    let mut core = shared.lock_core();
    loop {
        // Nothing queued: sleep until a producer wakes us.
        if core.queue.is_empty() {
            core = shared.wakeup.wait(core).unwrap_or_else(PoisonError::into_inner);
            continue;
        }

        // The shutdown marker sorts after all queued work, so seeing it at
        // the head means the drain (or discard) is complete.
        if core
            .queue
            .peek()
            .is_some_and(ScheduledEvent::is_shutdown_marker)
        {
            let _marker = core.queue.pop();
            drop(core);
            break;
        }

        let Some(head_due) = core.queue.peek().map(ScheduledEvent::due) else {
            continue;
        };
        let now = clock.now();

        if head_due > now {
            // Not due yet: arm the single timed sleep for exactly the gap.
            // A producer inserting an earlier minimum, a cancellation of the
            // head, a stop request or a clock jump interrupts it.
            core.armed_until = Some(head_due);
            let (guard, _timed_out) = shared
                .wakeup
                .wait_timeout(core, head_due - now)
                .unwrap_or_else(PoisonError::into_inner);
            core = guard;
            core.armed_until = None;
            continue;
        }

        // Due: pop, reschedule a recurring occurrence before anything else
        // can observe the gap, then dispatch outside the lock.
        let Some(event) = core.queue.pop() else {
            continue;
        };
        {
            // Reborrow the guard so the registry entry and the other fields
            // can be borrowed disjointly.
            let core = &mut *core;
            if let Some(entry) = core.recurring.get_mut(&event.recurring_id()) {
                core.next_seq += 1;
                let next = event.next_occurrence(entry.interval, core.next_seq);
                entry.live_seq = core.next_seq;
                debug!(
                    recurring_id = event.recurring_id(),
                    next_due_us = next.due().as_micros() as u64,
                    "recurring event rescheduled"
                );
                core.queue.push(next);
            }
        }

        // Producers must never wait out dispatch latency.
        drop(core);
        dispatcher.dispatch(event);
        core = shared.lock_core();
    }

    // Tear down pool workers (if any) before the thread exits, so a draining
    // stop() returns only after queued hand-offs have completed.
    dispatcher.shutdown();
    debug!(scheduler = %name, "worker loop exited");
}

// ── Tests ─────────────────────────────────────────────────────────────────────
