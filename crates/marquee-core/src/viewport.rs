#![forbid(unsafe_code)]

//! Viewport width tracking with resize coalescing.
//!
//! Hosts observe strip resizes through a resize-notification capability where
//! one exists, or global resize events as a fallback. Either way the events
//! arrive in bursts while the user drags, and restarting the active entry's
//! animation on every intermediate width is wasted work. [`ViewportTracker`]
//! applies latest-wins coalescing with a bounded deadline:
//!
//! - the final width of a burst is never dropped;
//! - a pending width is released once the stream goes quiet for
//!   [`ViewportConfig::settle`], or unconditionally after
//!   [`ViewportConfig::deadline`];
//! - widths equal to the current one are absorbed, so `poll` never yields a
//!   no-op change.
//!
//! The tracker is host plumbing: the settled width it yields is what gets
//! pushed into [`TickerEngine::set_viewport_width`].
//!
//! [`TickerEngine::set_viewport_width`]: crate::engine::TickerEngine::set_viewport_width

use std::time::{Duration, Instant};

/// Configuration for resize coalescing.
#[derive(Debug, Clone)]
pub struct ViewportConfig {
    /// Quiet period after the last resize event before the pending width is
    /// released. Default: 50 ms.
    pub settle: Duration,

    /// Hard deadline after the first pending event. Guarantees bounded
    /// latency even while events keep streaming. Default: 250 ms.
    pub deadline: Duration,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(50),
            deadline: Duration::from_millis(250),
        }
    }
}

/// Latest-wins width coalescer for the visible strip.
#[derive(Debug, Clone)]
pub struct ViewportTracker {
    config: ViewportConfig,
    current: Option<u32>,
    pending: Option<u32>,
    first_pending_at: Option<Instant>,
    last_event_at: Option<Instant>,
}

impl ViewportTracker {
    /// Create a tracker with the given configuration.
    pub fn new(config: ViewportConfig) -> Self {
        Self {
            config,
            current: None,
            pending: None,
            first_pending_at: None,
            last_event_at: None,
        }
    }

    /// Record a raw resize event.
    pub fn observe(&mut self, width: u32, now: Instant) {
        if self.pending.is_none() && self.current == Some(width) {
            return;
        }
        if self.pending.is_none() {
            self.first_pending_at = Some(now);
        }
        self.pending = Some(width);
        self.last_event_at = Some(now);
    }

    /// Yield the settled width, if a pending burst has quieted down or hit
    /// the deadline and the width actually changed.
    pub fn poll(&mut self, now: Instant) -> Option<u32> {
        let width = self.pending?;
        let quiet = self
            .last_event_at
            .is_some_and(|at| now.saturating_duration_since(at) >= self.config.settle);
        let overdue = self
            .first_pending_at
            .is_some_and(|at| now.saturating_duration_since(at) >= self.config.deadline);
        if !quiet && !overdue {
            return None;
        }
        self.pending = None;
        self.first_pending_at = None;
        self.last_event_at = None;
        if self.current == Some(width) {
            return None; // burst ended where it started
        }
        self.current = Some(width);
        Some(width)
    }

    /// When [`poll`](Self::poll) next needs to run, if a width is pending.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending?;
        let quiet_at = self.last_event_at.map(|at| at + self.config.settle);
        let overdue_at = self.first_pending_at.map(|at| at + self.config.deadline);
        match (quiet_at, overdue_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// The last settled width.
    pub fn current(&self) -> Option<u32> {
        self.current
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
