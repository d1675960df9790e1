#![forbid(unsafe_code)]

//! Deadline scheduling for the ticker state machine.
//!
//! [`TimerQueue`] is the engine's only notion of time: the controller arms
//! deadlines, the host polls with its own clock, and due timers fire in
//! deadline order. Nothing here sleeps or spawns threads.
//!
//! # Invariants
//!
//! 1. Cancellation is total and synchronous: after [`TimerQueue::cancel_all`]
//!    no previously armed timer can ever fire.
//! 2. Timers due at the same instant fire in arming order.
//! 3. The [`TimerStats`] counters are monotone; tests use them to assert that
//!    cancellation strictly precedes re-arming across a recomputation.

use std::time::Instant;

/// What a due timer means to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Fixed readability pause of a fitting entry ended; hard-cut advance.
    AdvanceAfterPause,
    /// The active entry was still unmeasured at pause entry; look again.
    RemeasureRetry,
    /// Post-scroll pause ended; compute and schedule the exit slide.
    ExitAfterPause,
    /// The exit transition's completion notification never arrived;
    /// force-finalize the cycle.
    Watchdog,
}

#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Instant,
    kind: TimerKind,
    seq: u64,
}

/// Lifetime counters for scheduling activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimerStats {
    /// Timers armed.
    pub armed: u64,
    /// Timers removed by cancellation before firing.
    pub canceled: u64,
    /// Timers that fired.
    pub fired: u64,
}

/// The engine's pending deadlines.
#[derive(Debug, Default)]
pub struct TimerQueue {
    armed: Vec<Deadline>,
    seq: u64,
    stats: TimerStats,
}

impl TimerQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a timer to fire at `at`.
    pub fn arm(&mut self, kind: TimerKind, at: Instant) {
        self.seq += 1;
        self.stats.armed += 1;
        self.armed.push(Deadline {
            at,
            kind,
            seq: self.seq,
        });
    }

    /// Drop every armed timer.
    pub fn cancel_all(&mut self) {
        self.stats.canceled += self.armed.len() as u64;
        self.armed.clear();
    }

    /// Remove and return every timer due at `now`, in deadline order.
    pub fn fire_due(&mut self, now: Instant) -> Vec<TimerKind> {
        let mut due: Vec<Deadline> = Vec::new();
        self.armed.retain(|deadline| {
            if deadline.at <= now {
                due.push(*deadline);
                false
            } else {
                true
            }
        });
        due.sort_by_key(|deadline| (deadline.at, deadline.seq));
        self.stats.fired += due.len() as u64;
        due.into_iter().map(|deadline| deadline.kind).collect()
    }

    /// Earliest pending deadline, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.armed.iter().map(|deadline| deadline.at).min()
    }

    /// Number of armed timers.
    pub fn len(&self) -> usize {
        self.armed.len()
    }

    /// Whether no timer is armed.
    pub fn is_empty(&self) -> bool {
        self.armed.is_empty()
    }

    /// Lifetime scheduling counters.
    pub fn stats(&self) -> TimerStats {
        self.stats
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
