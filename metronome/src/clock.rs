/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Injectable time sources.
//!
//! The engine never reads wall-clock time directly: it asks a [`Clock`] for
//! the current instant, expressed as a [`Time`] offset from the clock's own
//! epoch.  Production code uses [`MonotonicClock`]; tests inject a
//! [`ManualClock`] and advance it explicitly, which makes every timing
//! property in the scheduler test suite deterministic.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// An instant on a [`Clock`], measured from the clock's epoch.
pub type Time = Duration;

/// Callback a scheduler registers with its clock so the clock can interrupt
/// the worker's timed sleep when time jumps discontinuously.
pub type ClockWaker = Arc<dyn Fn() + Send + Sync>;

// ── Clock trait ───────────────────────────────────────────────────────────────

/// A monotonically non-decreasing time source.
pub trait Clock: Send + Sync + 'static {
    /// Current instant.  Successive calls must never go backwards.
    fn now(&self) -> Time;

    /// Called once by each scheduler using this clock.
    ///
    /// Clocks whose time can jump (a [`ManualClock`] being advanced by a
    /// test) must invoke every registered waker after each jump so a sleeping
    /// worker re-reads the clock.  Steady clocks ignore this; real time
    /// never jumps, and the worker's timed sleep already matches it.
    fn register_waker(&self, _waker: ClockWaker) {}
}

// ── MonotonicClock ────────────────────────────────────────────────────────────

/// Production clock: [`Instant`] elapsed since construction.
///
/// Immune to wall-clock adjustments (NTP steps, manual changes); its epoch is
/// the moment it was created.
#[derive(Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Time {
        self.origin.elapsed()
    }
}

// ── ManualClock ───────────────────────────────────────────────────────────────

/// Test clock: time stands still until the owner advances it.
///
/// Every [`advance`](Self::advance) (or forward [`set`](Self::set)) invokes
/// the wakers registered by schedulers driving off this clock, so a worker
/// sleeping until a due time observes the jump immediately instead of waiting
/// out a real-time timeout.
pub struct ManualClock {
    state: Mutex<ManualState>,
}

struct ManualState {
    now: Time,
    wakers: Vec<ClockWaker>,
}

impl ManualClock {
    /// A clock frozen at its epoch (`Time::ZERO`).
    pub fn new() -> Self {
        Self::starting_at(Time::ZERO)
    }

    /// A clock frozen at `start`.
    pub fn starting_at(start: Time) -> Self {
        Self {
            state: Mutex::new(ManualState {
                now: start,
                wakers: Vec::new(),
            }),
        }
    }

    /// Move time forward by `step` and wake all registered schedulers.
    pub fn advance(&self, step: Time) {
        let wakers = {
            let mut state = self.lock_state();
            state.now += step;
            state.wakers.clone()
        };
        for waker in wakers {
            waker();
        }
    }

    /// Move time forward to `instant`.
    ///
    /// Backward targets are ignored; the clock contract is monotonic
    /// non-decreasing, so the reading saturates at its current value.
    pub fn set(&self, instant: Time) {
        let wakers = {
            let mut state = self.lock_state();
            state.now = state.now.max(instant);
            state.wakers.clone()
        };
        for waker in wakers {
            waker();
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Time {
        self.lock_state().now
    }

    fn register_waker(&self, waker: ClockWaker) {
        self.lock_state().wakers.push(waker);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn monotonic_clock_never_goes_backwards() {
        let clock = MonotonicClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }

    #[test]
    fn manual_clock_starts_frozen() {
        let clock = ManualClock::new();
        assert_eq!(clock.now(), Time::ZERO);
        assert_eq!(clock.now(), Time::ZERO);
    }

    #[test]
    fn manual_clock_advance_accumulates() {
        let clock = ManualClock::new();
        clock.advance(Duration::from_secs(1));
        clock.advance(Duration::from_millis(500));
        assert_eq!(clock.now(), Duration::from_millis(1_500));
    }

    #[test]
    fn manual_clock_set_saturates_backward_targets() {
        let clock = ManualClock::starting_at(Duration::from_secs(5));
        clock.set(Duration::from_secs(2));
        assert_eq!(clock.now(), Duration::from_secs(5));
        clock.set(Duration::from_secs(7));
        assert_eq!(clock.now(), Duration::from_secs(7));
    }

    #[test]
    fn manual_clock_advance_invokes_registered_wakers() {
        let clock = ManualClock::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        clock.register_waker(Arc::new(move || {
            counted.fetch_add(1, Ordering::SeqCst);
        }));

        clock.advance(Duration::from_secs(1));
        clock.set(Duration::from_secs(3));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
