/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Metronome – thread-safe priority event scheduler
//!
//! An in-process engine that accepts one-shot and recurring timed actions
//! from any number of producer threads and dispatches them at their due time
//! with deterministic tie-breaking, safe cancellation, and graceful or hard
//! shutdown.  Built for equipment-orchestration workloads (periodic polling,
//! delayed command dispatch), but has no opinion about what an action does.
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── clock.rs        – injectable time sources (monotonic + manual test clock)
//! ├── config/         – YAML scheduler configuration
//! ├── dispatch/       – serialized / concurrent / pooled action dispatch
//! ├── event.rs        – scheduled-event record, ordering key, handles
//! └── scheduler/      – the engine: min-heap queue, worker loop, errors
//! ```

pub mod clock;
pub mod config;
pub mod dispatch;
pub mod event;
pub mod scheduler;
