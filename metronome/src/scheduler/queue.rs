/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Min-heap event queue keyed by `(due, priority, seq)`.
//!
//! A thin wrapper over `BinaryHeap<Reverse<ScheduledEvent>>` that adds the
//! two operations the engine needs beyond push/pop-min: arbitrary removal by
//! sequence number (cancellation) and a non-destructive ordered snapshot.
//!
//! Removal goes through [`BinaryHeap::retain`], which rebuilds the heap, so
//! heap order cannot be left violated by a removal.  Heap order is a hard
//! internal invariant (a wrong minimum silently breaks dispatch ordering),
//! so debug builds re-verify the head after every removal and fail fast.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::clock::Time;
use crate::event::{EventInfo, ScheduledEvent};

#[derive(Debug, Default)]
pub(crate) struct EventQueue {
    heap: BinaryHeap<Reverse<ScheduledEvent>>,
}

impl EventQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, event: ScheduledEvent) {
        self.heap.push(Reverse(event));
    }

    pub(crate) fn pop(&mut self) -> Option<ScheduledEvent> {
        self.heap.pop().map(|Reverse(event)| event)
    }

    pub(crate) fn peek(&self) -> Option<&ScheduledEvent> {
        self.heap.peek().map(|Reverse(event)| event)
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.heap.clear();
    }

    /// Remove the event with sequence number `seq`, if still queued.
    ///
    /// Returns `true` when an event was actually removed.  `seq` is unique,
    /// so at most one event can match.
    pub(crate) fn remove_seq(&mut self, seq: u64) -> bool {
        let before = self.heap.len();
        self.heap.retain(|Reverse(event)| event.seq() != seq);
        let removed = self.heap.len() != before;
        if removed {
            self.debug_assert_head_is_min();
        }
        removed
    }

    /// Due time of the latest-scheduled event (the maximum over the heap).
    ///
    /// Used by `stop()` to place the shutdown marker after every queued
    /// event.  Linear scan; the heap only orders its minimum.
    pub(crate) fn latest_due(&self) -> Option<Time> {
        self.heap.iter().map(|Reverse(event)| event.due()).max()
    }

    /// Point-in-time copy in dispatch order, without disturbing the live
    /// queue.  The engine's shutdown marker is internal and excluded.
    pub(crate) fn snapshot(&self) -> Vec<EventInfo> {
        let mut copy = self.heap.clone();
        let mut ordered = Vec::with_capacity(copy.len());
        while let Some(Reverse(event)) = copy.pop() {
            if !event.is_shutdown_marker() {
                ordered.push(EventInfo::from(&event));
            }
        }
        ordered
    }

    /// Debug-only invariant check: the head must be the true minimum.
    fn debug_assert_head_is_min(&self) {
        #[cfg(debug_assertions)]
        if let Some(Reverse(head)) = self.heap.peek() {
            debug_assert!(
                self.heap.iter().all(|Reverse(event)| head <= event),
                "event queue head is not the minimum after removal"
            );
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Priority;
    use std::sync::Arc;
    use std::time::Duration;

    fn event(seq: u64, due_ms: u64, priority: Priority) -> ScheduledEvent {
        ScheduledEvent::one_shot(seq, Duration::from_millis(due_ms), priority, Arc::new(|| {}))
    }

    fn pop_seqs(queue: &mut EventQueue) -> Vec<u64> {
        let mut seqs = Vec::new();
        while let Some(ev) = queue.pop() {
            seqs.push(ev.seq());
        }
        seqs
    }

    #[test]
    fn pops_in_due_time_order() {
        let mut queue = EventQueue::new();
        queue.push(event(1, 30, 0));
        queue.push(event(2, 10, 0));
        queue.push(event(3, 20, 0));
        assert_eq!(pop_seqs(&mut queue), vec![2, 3, 1]);
    }

    #[test]
    fn equal_due_time_pops_lower_priority_value_first() {
        let mut queue = EventQueue::new();
        queue.push(event(1, 10, 5));
        queue.push(event(2, 10, 1));
        queue.push(event(3, 10, 3));
        assert_eq!(pop_seqs(&mut queue), vec![2, 3, 1]);
    }

    #[test]
    fn equal_due_and_priority_pops_in_submission_order() {
        let mut queue = EventQueue::new();
        for seq in 1..=5 {
            queue.push(event(seq, 10, 2));
        }
        assert_eq!(pop_seqs(&mut queue), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn remove_seq_deletes_exactly_one_event_and_keeps_order() {
        let mut queue = EventQueue::new();
        queue.push(event(1, 10, 0));
        queue.push(event(2, 20, 0));
        queue.push(event(3, 30, 0));

        assert!(queue.remove_seq(2));
        assert_eq!(queue.len(), 2);
        assert_eq!(pop_seqs(&mut queue), vec![1, 3]);
    }

    #[test]
    fn remove_seq_of_absent_event_is_a_no_op() {
        let mut queue = EventQueue::new();
        queue.push(event(1, 10, 0));
        assert!(!queue.remove_seq(99));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn removing_the_minimum_promotes_the_next_event() {
        let mut queue = EventQueue::new();
        queue.push(event(1, 10, 0));
        queue.push(event(2, 20, 0));
        assert!(queue.remove_seq(1));
        assert_eq!(queue.peek().map(ScheduledEvent::seq), Some(2));
    }

    #[test]
    fn latest_due_scans_the_whole_heap() {
        let mut queue = EventQueue::new();
        assert_eq!(queue.latest_due(), None);
        queue.push(event(1, 10, 0));
        queue.push(event(2, 50, 0));
        queue.push(event(3, 30, 0));
        assert_eq!(queue.latest_due(), Some(Duration::from_millis(50)));
    }

    #[test]
    fn snapshot_is_ordered_and_non_destructive() {
        let mut queue = EventQueue::new();
        queue.push(event(1, 30, 0));
        queue.push(event(2, 10, 0));
        queue.push(event(3, 10, 1));

        let snap = queue.snapshot();
        let seqs: Vec<u64> = snap.iter().map(|info| info.seq).collect();
        assert_eq!(seqs, vec![2, 3, 1]);
        assert_eq!(queue.len(), 3, "snapshot must not drain the live queue");
    }
}
