//! Dispatch strategies for due events.
//!
//! The worker loop pops an event and hands it to a [`Dispatcher`], which runs
//! the action according to the [`DispatchMode`] fixed at engine construction.
//! Whatever the mode, every action runs inside a panic-recovery boundary: a
//! panicking action is logged and contained, and can never take down the
//! worker thread or a pool worker.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread;

use crossbeam_channel::{unbounded, Sender};
use tracing::{debug, error, warn};

use crate::event::ScheduledEvent;

// ── DispatchMode ──────────────────────────────────────────────────────────────

/// How a due event's action is handed to execution.
///
/// Fixed at engine construction; part of
/// [`SchedulerConfig`](crate::config::SchedulerConfig).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// The worker calls the action inline and waits for it to return.
    ///
    /// Guarantees no two actions run concurrently and that actions run in
    /// scheduler order.  A slow action delays every subsequent event; that
    /// is the contract, not a defect.
    Serialized,

    /// One detached thread per fired event; the worker continues immediately.
    ///
    /// No ordering or mutual-exclusion guarantee between concurrently due
    /// actions, and fan-out is unbounded when many events become due in a
    /// burst; bounding it is the caller's responsibility (or use `Pool`).
    Concurrent,

    /// A fixed pool of worker threads fed over a channel.
    ///
    /// Bounds fan-out under bursty load while keeping the scheduler worker
    /// free of dispatch latency.  Events are executed in hand-off order but
    /// may overlap across pool workers.
    Pool {
        /// Number of pool threads.  Zero is coerced to one.
        workers: usize,
    },
}

impl Default for DispatchMode {
    fn default() -> Self {
        DispatchMode::Serialized
    }
}

// ── Dispatcher ────────────────────────────────────────────────────────────────

/// Runtime dispatch strategy, built from a [`DispatchMode`] when the engine
/// starts and torn down when the worker exits.
pub(crate) enum Dispatcher {
    Serialized,
    Concurrent,
    Pool(WorkerPool),
}

impl Dispatcher {
    pub(crate) fn build(mode: DispatchMode, name: &str) -> Self {
        match mode {
            DispatchMode::Serialized => Dispatcher::Serialized,
            DispatchMode::Concurrent => Dispatcher::Concurrent,
            DispatchMode::Pool { workers } => {
                Dispatcher::Pool(WorkerPool::spawn(workers.max(1), name))
            }
        }
    }

    /// Hand one due event to its action.  Never propagates a panic back to
    /// the caller.
    pub(crate) fn dispatch(&self, event: ScheduledEvent) {
        match self {
            Dispatcher::Serialized => run_isolated(&event),
            Dispatcher::Concurrent => {
                let seq = event.seq();
                let spawned = thread::Builder::new()
                    .name(format!("fire-{seq}"))
                    .spawn(move || run_isolated(&event));
                if let Err(e) = spawned {
                    // The closure (and the event) is gone with the failed spawn.
                    error!(seq, error = %e, "failed to spawn dispatch thread; event dropped");
                }
            }
            Dispatcher::Pool(pool) => pool.submit(event),
        }
    }

    /// Tear down pool workers, if any.  Blocks until queued hand-offs have
    /// drained, so a draining `stop()` returns only after every dispatched
    /// action has run.
    pub(crate) fn shutdown(self) {
        if let Dispatcher::Pool(pool) = self {
            pool.shutdown();
        }
    }
}

// ── Panic boundary ────────────────────────────────────────────────────────────

/// Run one action inside the panic-recovery boundary.
///
/// An action failure must never terminate the scheduler or affect unrelated
/// events, so the panic is caught here, logged, and discarded.
fn run_isolated(event: &ScheduledEvent) {
    debug!(
        seq = event.seq(),
        recurring_id = event.recurring_id(),
        priority = event.priority(),
        due_us = event.due().as_micros() as u64,
        "dispatching event"
    );

    if let Err(payload) = catch_unwind(AssertUnwindSafe(|| event.fire())) {
        let message = payload
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
            .unwrap_or("<non-string panic payload>");
        error!(
            seq = event.seq(),
            recurring_id = event.recurring_id(),
            panic = message,
            "event action panicked; scheduler continues"
        );
    }
}

// ── WorkerPool ────────────────────────────────────────────────────────────────

/// Fixed set of threads draining a shared event channel.
pub(crate) struct WorkerPool {
    sender: Option<Sender<ScheduledEvent>>,
    handles: Vec<thread::JoinHandle<()>>,
}

impl WorkerPool {
    fn spawn(workers: usize, name: &str) -> Self {
        let (sender, receiver) = unbounded::<ScheduledEvent>();
        let mut handles = Vec::with_capacity(workers);

        for index in 0..workers {
            let receiver = receiver.clone();
            let spawned = thread::Builder::new()
                .name(format!("{name}-pool-{index}"))
                .spawn(move || {
                    for event in receiver.iter() {
                        run_isolated(&event);
                    }
                });
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => error!(worker = index, error = %e, "failed to spawn pool worker"),
            }
        }

        debug!(workers = handles.len(), "dispatch pool ready");
        Self {
            sender: Some(sender),
            handles,
        }
    }

    fn submit(&self, event: ScheduledEvent) {
        let Some(sender) = &self.sender else {
            return;
        };
        if let Err(e) = sender.send(event) {
            // All pool workers are gone (every spawn failed, or they died).
            error!(seq = e.into_inner().seq(), "dispatch pool unavailable; event dropped");
        }
    }

    /// Close the channel and join every worker.  Workers drain whatever is
    /// already queued before exiting.
    fn shutdown(mut self) {
        self.sender.take();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                // run_isolated catches action panics, so this is unexpected.
                warn!("dispatch pool worker terminated abnormally");
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
