/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Core event data structures for the Metronome scheduler.
//!
//! A [`ScheduledEvent`] is the unit of work the engine queues and fires:
//!
//! ```text
//! producer ──(enter_*)──►  ScheduledEvent  ──(worker pops)──►  Dispatcher
//!                           ↑ immutable after creation
//! ```
//!
//! # Ordering model
//! Events are totally ordered by the key `(due, priority, seq)`:
//!
//! * `due`: the absolute instant (per the injected clock) the event becomes
//!   eligible to fire; earlier fires first.
//! * `priority`: tie-break among events with equal `due`; lower fires first.
//! * `seq`: a monotonic sequence number assigned under the engine mutex.
//!   It makes the order total, so two events submitted with identical
//!   `(due, priority)` fire in submission order, a hard guarantee rather than an
//!   accident of heap layout.  It is also the cancellation identity for
//!   one-shot events.
//!
//! # Ownership model
//! The action is an `Arc<dyn Fn()>` capturing its arguments at submission
//! time; there is no mutation after creation.  Recurring events re-insert a
//! fresh `ScheduledEvent` that shares the same action via `Arc::clone`.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::clock::Time;

// ── Priorities ────────────────────────────────────────────────────────────────

/// Tie-break among events with equal due time.  Lower fires first.
pub type Priority = u32;

/// Reserved maximum priority, used only by the internal shutdown marker the
/// engine queues on `stop()`.  User priorities must be strictly below this
/// value; submissions at or above it fail with
/// [`SchedulerError::InvalidPriority`](crate::scheduler::error::SchedulerError::InvalidPriority).
pub const SHUTDOWN_PRIORITY: Priority = Priority::MAX;

/// Conventional priority for callers that do not care about tie-breaking.
pub const DEFAULT_PRIORITY: Priority = 0;

// ── Actions ───────────────────────────────────────────────────────────────────

/// The work an event performs when it fires.
///
/// Shared (`Arc`) so a recurring event's occurrences can all reference the
/// same closure; `Send + Sync` so it can be handed to pool or per-event
/// dispatch threads.
pub type Action = Arc<dyn Fn() + Send + Sync + 'static>;

// ── Handles ───────────────────────────────────────────────────────────────────

/// Cancellation handle for a one-shot event, returned by
/// [`enter_at`](crate::scheduler::EventScheduler::enter_at) and
/// [`enter_after`](crate::scheduler::EventScheduler::enter_after).
///
/// Wraps the event's unique sequence number.  Cancelling is idempotent:
/// a handle whose event already fired (or was already cancelled) cancels as a
/// successful no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventHandle(pub(crate) u64);

/// Cancellation handle for a recurring registration, returned by
/// [`enter_recurring`](crate::scheduler::EventScheduler::enter_recurring).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecurringHandle(pub(crate) u64);

// ── ScheduledEvent ────────────────────────────────────────────────────────────

/// One pending unit of work: due time, tie-break priority, the action, and
/// the identities used for ordering and cancellation.
///
/// Immutable after creation.  Constructed only by the engine (submission
/// operations and the worker's recurring reschedule); embedders observe
/// events through [`EventInfo`] snapshots.
#[derive(Clone)]
pub struct ScheduledEvent {
    /// Unique, monotonically assigned under the engine mutex.  Third ordering
    /// key and the one-shot cancellation identity.
    seq: u64,
    /// Absolute instant on the engine's clock at which the event is eligible
    /// to fire.
    due: Time,
    /// Tie-break among events with equal `due`; lower fires first.
    priority: Priority,
    /// `0` for one-shot events; the positive registry key for recurring ones.
    recurring_id: u64,
    action: Action,
}

impl ScheduledEvent {
    /// A one-shot event.  Carries recurring id `0`.
    pub(crate) fn one_shot(seq: u64, due: Time, priority: Priority, action: Action) -> Self {
        Self {
            seq,
            due,
            priority,
            recurring_id: 0,
            action,
        }
    }

    /// The first occurrence of a recurring registration.
    pub(crate) fn recurring(
        seq: u64,
        due: Time,
        priority: Priority,
        recurring_id: u64,
        action: Action,
    ) -> Self {
        Self {
            seq,
            due,
            priority,
            recurring_id,
            action,
        }
    }

    /// The synthetic event `stop()` queues to make the worker exit.
    ///
    /// Its priority is the reserved maximum, so with `due` set to the latest
    /// queued due time it sorts after every real event still due at or before
    /// it; the worker drains those first, then observes the marker.
    pub(crate) fn shutdown_marker(seq: u64, due: Time) -> Self {
        Self {
            seq,
            due,
            priority: SHUTDOWN_PRIORITY,
            recurring_id: 0,
            action: Arc::new(|| {}),
        }
    }

    /// The next occurrence of a recurring event, anchored to the previous
    /// **due time** rather than the current clock reading, so a delayed
    /// firing does not shift the cadence.
    pub(crate) fn next_occurrence(&self, interval: Time, seq: u64) -> Self {
        Self {
            seq,
            due: self.due + interval,
            priority: self.priority,
            recurring_id: self.recurring_id,
            action: Arc::clone(&self.action),
        }
    }

    pub(crate) fn seq(&self) -> u64 {
        self.seq
    }

    pub(crate) fn due(&self) -> Time {
        self.due
    }

    pub(crate) fn priority(&self) -> Priority {
        self.priority
    }

    pub(crate) fn recurring_id(&self) -> u64 {
        self.recurring_id
    }

    pub(crate) fn is_shutdown_marker(&self) -> bool {
        self.priority == SHUTDOWN_PRIORITY
    }

    /// Run the action.  Callers wrap this in the dispatch panic boundary.
    pub(crate) fn fire(&self) {
        (self.action)();
    }

    /// The full ordering key.
    fn key(&self) -> (Time, Priority, u64) {
        (self.due, self.priority, self.seq)
    }
}

// Comparison is over the ordering key only; the action is deliberately
// excluded, and `seq` uniqueness makes the order total.
impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl fmt::Debug for ScheduledEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledEvent")
            .field("seq", &self.seq)
            .field("due", &self.due)
            .field("priority", &self.priority)
            .field("recurring_id", &self.recurring_id)
            .finish_non_exhaustive()
    }
}

// ── EventInfo ─────────────────────────────────────────────────────────────────

/// Point-in-time description of a queued event, as returned by
/// [`snapshot`](crate::scheduler::EventScheduler::snapshot).
///
/// Carries everything except the action; intended for inspection and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventInfo {
    /// Unique sequence number of the queued instance.
    pub seq: u64,
    /// `0` for one-shot events; the registry key for recurring ones.
    pub recurring_id: u64,
    /// Absolute due instant on the engine's clock.
    pub due: Time,
    /// Tie-break priority.
    pub priority: Priority,
}

impl From<&ScheduledEvent> for EventInfo {
    fn from(event: &ScheduledEvent) -> Self {
        EventInfo {
            seq: event.seq,
            recurring_id: event.recurring_id,
            due: event.due,
            priority: event.priority,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn event(seq: u64, due_ms: u64, priority: Priority) -> ScheduledEvent {
        ScheduledEvent::one_shot(seq, Duration::from_millis(due_ms), priority, Arc::new(|| {}))
    }

    // ── Ordering key ──────────────────────────────────────────────────────────

    #[test]
    fn earlier_due_time_sorts_first() {
        assert!(event(1, 10, 5) < event(2, 20, 0));
    }

    #[test]
    fn equal_due_time_breaks_tie_on_priority() {
        assert!(event(1, 10, 1) < event(2, 10, 5));
        // priority wins over submission order
        assert!(event(9, 10, 1) < event(2, 10, 5));
    }

    #[test]
    fn equal_due_and_priority_breaks_tie_on_seq() {
        assert!(event(1, 10, 5) < event(2, 10, 5));
        assert!(event(2, 10, 5) > event(1, 10, 5));
    }

    #[test]
    fn equal_keys_do_not_panic_and_compare_equal() {
        let a = event(7, 10, 5);
        let b = event(7, 10, 5);
        assert_eq!(a, b);
        assert_eq!(a.cmp(&b), Ordering::Equal);
    }

    // ── Shutdown marker ───────────────────────────────────────────────────────

    #[test]
    fn shutdown_marker_sorts_after_real_events_with_equal_due() {
        let marker = ScheduledEvent::shutdown_marker(99, Duration::from_millis(10));
        assert!(event(1, 10, 5) < marker);
        assert!(event(1, 10, SHUTDOWN_PRIORITY - 1) < marker);
        assert!(marker.is_shutdown_marker());
    }

    #[test]
    fn shutdown_marker_sorts_before_events_due_later() {
        let marker = ScheduledEvent::shutdown_marker(99, Duration::from_millis(10));
        assert!(marker < event(1, 11, 0));
    }

    // ── Recurring reschedule ──────────────────────────────────────────────────

    #[test]
    fn next_occurrence_is_anchored_to_previous_due_time() {
        let first = ScheduledEvent::recurring(
            1,
            Duration::from_secs(1),
            DEFAULT_PRIORITY,
            42,
            Arc::new(|| {}),
        );
        let second = first.next_occurrence(Duration::from_secs(1), 2);

        assert_eq!(second.due(), Duration::from_secs(2));
        assert_eq!(second.recurring_id(), 42);
        assert_eq!(second.priority(), first.priority());
        assert_eq!(second.seq(), 2);
    }

    // ── EventInfo ─────────────────────────────────────────────────────────────

    #[test]
    fn event_info_copies_the_ordering_fields() {
        let ev = event(3, 25, 7);
        let info = EventInfo::from(&ev);
        assert_eq!(info.seq, 3);
        assert_eq!(info.due, Duration::from_millis(25));
        assert_eq!(info.priority, 7);
        assert_eq!(info.recurring_id, 0);
    }
}
