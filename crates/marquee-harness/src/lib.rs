#![forbid(unsafe_code)]

//! Deterministic host simulation for the ticker engine.
//!
//! The engine is a closed-loop controller: it emits placements, the surface
//! applies them and reports transition completions, and timers fill the gaps.
//! Testing that loop against a real renderer would be slow and flaky, so this
//! crate stands in for the host side:
//!
//! - [`SimClock`] — a virtual clock; nothing here reads wall time twice.
//! - [`TextRuler`] — measurement stand-in: width is the text's display cell
//!   count times a fixed per-cell pixel size, the same arithmetic for the
//!   full text and its first token.
//! - [`SurfaceSim`] — owns a [`TickerEngine`], applies drained outputs,
//!   synthesizes transform completions exactly `duration` after an animated
//!   placement (zero-duration placements complete silently, as real
//!   transition events do), and advances time deadline-to-deadline.
//!
//! Completion delivery can be capped via [`SurfaceSim::allow_completions`] to
//! reproduce lost `transitionend` notifications and exercise the watchdog.

use std::time::{Duration, Instant};

use tracing::trace;
use unicode_width::UnicodeWidthStr;

use marquee_core::{
    DisplayMode, EntryKey, Measurement, Output, SourceContent, TickerConfig, TickerEngine,
    TransitionProperty, ViewportConfig, ViewportTracker, first_token,
};

/// Paint-opportunity cadence of the simulated surface.
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Virtual monotone clock.
#[derive(Debug, Clone, Copy)]
pub struct SimClock {
    now: Instant,
}

impl SimClock {
    /// Create a clock anchored at an arbitrary origin.
    pub fn new() -> Self {
        Self {
            now: Instant::now(),
        }
    }

    /// Current simulated instant.
    pub fn now(&self) -> Instant {
        self.now
    }

    /// Advance by `dt`.
    pub fn advance(&mut self, dt: Duration) {
        self.now += dt;
    }

    /// Advance to `at`; never moves backward.
    pub fn advance_to(&mut self, at: Instant) {
        if at > self.now {
            self.now = at;
        }
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Measurement stand-in
// ---------------------------------------------------------------------------

/// Fixed-pitch measurement stand-in for the off-screen duplicate render.
#[derive(Debug, Clone, Copy)]
pub struct TextRuler {
    /// Pixels per display cell.
    pub cell_px: u32,
}

impl Default for TextRuler {
    fn default() -> Self {
        Self { cell_px: 8 }
    }
}

impl TextRuler {
    /// Measure `text` the way the surface's duplicate render would.
    pub fn measure(&self, text: &str) -> Measurement {
        Measurement {
            full_width: text.width() as u32 * self.cell_px,
            first_word_width: first_token(text).width() as u32 * self.cell_px,
        }
    }
}

// ---------------------------------------------------------------------------
// Surface simulation
// ---------------------------------------------------------------------------

/// Simulated rendering surface driving a [`TickerEngine`].
#[derive(Debug)]
pub struct SurfaceSim {
    engine: TickerEngine,
    clock: SimClock,
    viewport: ViewportTracker,
    ruler: Option<TextRuler>,
    /// Completion due for the transform currently interpolating, if any.
    inflight: Option<Instant>,
    /// Completions still allowed to be delivered; `None` = unlimited.
    allowed: Option<usize>,
    applied: Vec<Output>,
}

impl SurfaceSim {
    /// Surface whose measurements the test pushes by hand via
    /// [`measure`](Self::measure).
    pub fn new(config: TickerConfig) -> Self {
        Self {
            engine: TickerEngine::new(config),
            clock: SimClock::new(),
            viewport: ViewportTracker::new(ViewportConfig::default()),
            ruler: None,
            inflight: None,
            allowed: None,
            applied: Vec::new(),
        }
    }

    /// Surface that measures entry text automatically with `ruler`.
    pub fn with_ruler(config: TickerConfig, ruler: TextRuler) -> Self {
        let mut sim = Self::new(config);
        sim.ruler = Some(ruler);
        sim
    }

    /// Deliver at most `n` more transform completions, dropping the rest.
    pub fn allow_completions(&mut self, n: usize) {
        self.allowed = Some(n);
    }

    /// The engine under test.
    pub fn engine(&self) -> &TickerEngine {
        &self.engine
    }

    /// Current simulated instant.
    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Every placement applied so far, oldest first.
    pub fn applied(&self) -> &[Output] {
        &self.applied
    }

    /// Placements applied so far, as `(translate_x, duration_ms, index)`.
    pub fn applied_triples(&self) -> Vec<(f64, u64, usize)> {
        self.applied
            .iter()
            .map(|out| (out.translate_x, out.duration.as_millis() as u64, out.entry_index))
            .collect()
    }

    /// Push content into the engine at the current instant.
    pub fn set_content(&mut self, content: &SourceContent, mode: DisplayMode) {
        self.engine.set_content(content, mode, self.clock.now());
    }

    /// Set the strip width directly (the settled value).
    pub fn set_viewport(&mut self, width: u32) {
        self.engine.set_viewport_width(width, self.clock.now());
    }

    /// Record a raw resize event; bursts coalesce before reaching the engine.
    pub fn observe_resize(&mut self, width: u32) {
        self.viewport.observe(width, self.clock.now());
    }

    /// Push a measurement by hand (manual-measure surfaces).
    pub fn measure(&mut self, key: EntryKey, measurement: Measurement) {
        self.engine.set_measurement(key, measurement, self.clock.now());
    }

    /// User activation on the ticker area.
    pub fn activate(&self) -> Option<&str> {
        self.engine.activate()
    }

    /// Run the closed loop for `span` of simulated time, advancing
    /// deadline-to-deadline.
    pub fn run_for(&mut self, span: Duration) {
        let end = self.clock.now() + span;
        loop {
            self.drive();
            let mut next: Option<Instant> = None;
            let mut consider = |at: Option<Instant>| {
                next = match (next, at) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (a, b) => a.or(b),
                };
            };
            consider(self.engine.next_deadline());
            consider(self.viewport.next_deadline());
            consider(self.inflight);
            if self.engine.needs_frame() {
                consider(Some(self.clock.now() + FRAME_INTERVAL));
            }
            match next {
                Some(at) if at <= end => self.clock.advance_to(at),
                _ => {
                    self.clock.advance_to(end);
                    self.drive();
                    return;
                }
            }
        }
    }

    /// One pass of the host loop at the current instant: measure, deliver a
    /// due completion, fire timers, run a paint opportunity, apply outputs.
    fn drive(&mut self) {
        let now = self.clock.now();

        if let Some(width) = self.viewport.poll(now) {
            self.engine.set_viewport_width(width, now);
        }

        if let Some(ruler) = self.ruler {
            for key in self.engine.pending_measure_keys() {
                let Some(text) = self
                    .engine
                    .entries()
                    .iter()
                    .find(|entry| entry.key() == key)
                    .map(|entry| entry.text().to_string())
                else {
                    continue;
                };
                self.engine.set_measurement(key, ruler.measure(&text), now);
            }
        }

        if self.inflight.is_some_and(|due| due <= now) {
            self.inflight = None;
            if self.take_completion_budget() {
                trace!("delivering transform completion");
                self.engine
                    .transition_finished(TransitionProperty::Transform, now);
            } else {
                trace!("withholding transform completion");
            }
        }

        self.engine.poll(now);
        if self.engine.needs_frame() {
            self.engine.frame(now);
        }

        for output in self.engine.drain_outputs() {
            trace!(?output, "applying placement");
            // A fresh transform replaces the in-flight interpolation; only an
            // animated one will ever produce a completion notification.
            self.inflight = (!output.duration.is_zero()).then(|| now + output.duration);
            self.applied.push(output);
        }
    }

    fn take_completion_budget(&mut self) -> bool {
        match self.allowed.as_mut() {
            None => true,
            Some(0) => false,
            Some(n) => {
                *n -= 1;
                true
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
