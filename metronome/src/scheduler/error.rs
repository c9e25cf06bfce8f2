/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured error types for the Metronome event scheduler.
//!
//! Every failure a caller can observe is reported synchronously through
//! [`SchedulerError`]; submission, cancellation and lifecycle operations
//! never panic on misuse.  Action failures are a separate concern: they are
//! isolated per-event inside the dispatch boundary and logged, never
//! surfaced as a `SchedulerError` (the scheduler does not interpret action
//! results).
//!
//! Every variant carries enough structured data for the caller to log a
//! fully-qualified `tracing` event without re-parsing the message.

use thiserror::Error;

use crate::event::{Priority, SHUTDOWN_PRIORITY};

use super::SchedulerState;

/// Failure reported by [`EventScheduler`](super::EventScheduler) operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// The submitted priority is at or above the reserved maximum.
    ///
    /// Nothing was enqueued.  Valid user priorities are
    /// `0..SHUTDOWN_PRIORITY`; the top value is reserved for the internal
    /// shutdown marker so it always sorts after real work.
    #[error("priority {priority} is reserved; user priorities must be below {max}", max = SHUTDOWN_PRIORITY)]
    InvalidPriority { priority: Priority },

    /// A recurring registration was submitted with a zero interval.
    ///
    /// A zero interval would make the occurrence due again the moment it is
    /// rescheduled and pin the worker in a dispatch loop.
    #[error("recurring interval must be non-zero")]
    InvalidInterval,

    /// The operation requires a `Running` engine.
    ///
    /// Submissions, cancellations and `stop()` are no-ops in any other state;
    /// the call reports this failure and changes nothing.
    #[error("scheduler is not running (state: {state})")]
    NotRunning { state: SchedulerState },

    /// `start()` was called on an engine that is not `Stopped`.
    #[error("scheduler was already started (state: {state})")]
    AlreadyStarted { state: SchedulerState },

    /// The OS refused to spawn the worker thread.
    ///
    /// The engine rolls back to `Stopped` so a later `start()` can retry.
    #[error("failed to spawn worker thread: {reason}")]
    WorkerSpawn { reason: String },
}

// ── Tests ─────────────────────────────────────────────────────────────────────
