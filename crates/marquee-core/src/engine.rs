#![forbid(unsafe_code)]

//! The ticker phase state machine.
//!
//! [`TickerEngine`] is a closed-loop controller for a fixed-width text strip.
//! It consumes an ordered entry set, a stream of width measurements, and the
//! viewport width, and produces `(translate_x, duration)` placements for the
//! rendering surface to apply as linear timed interpolations. The surface's
//! transition-completion notification (or a watchdog when that notification
//! is lost) drives the engine to its next state, indefinitely.
//!
//! The engine is headless and single-threaded. It never sleeps and never
//! reads a clock of its own: every mutating call takes `now`, timers are
//! armed on an internal [`TimerQueue`] the host polls, and multi-frame
//! sequencing (place instantly, then animate one paint later) is expressed as
//! a single queued frame step the host executes via [`TickerEngine::frame`].
//!
//! # Phases
//!
//! ```text
//!          +--------------------- content/mode/viewport change -----------+
//!          v                                                              |
//!  Idle -- decide --+-- fits, singleton --> Idle (static)                 |
//!                   +-- fits, rotating --> Pause --3s--> advance --> Idle-+
//!                   +-- overflows --> ToPause --done--> Pause --pause-->
//!                        ToExit --done|watchdog--> Idle (next entry)
//! ```
//!
//! # Invariants
//!
//! 1. At most one cycle is in flight: every recomputation and teardown
//!    cancels all outstanding timers and the queued frame step before
//!    anything new is scheduled, so a stale callback can never mutate state.
//! 2. Only `transform` completion notifications are honored; notifications
//!    for other properties on the same node are ignored.
//! 3. A zero measurement is "not yet", never an error: the decision defers
//!    and the pause entry retries on a short timer.
//! 4. The watchdog guarantees the exit phase always finalizes, even when the
//!    surface never reports completion (element detached mid-transition).

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::entry::{DisplayEntry, DisplayMode, EntryKey, EntrySet, SourceContent};
use crate::measure::{MeasurePool, Measurement};
use crate::schedule::{TimerKind, TimerQueue, TimerStats};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning constants for the ticker.
#[derive(Debug, Clone)]
pub struct TickerConfig {
    /// Scroll speed in pixels per second. Durations are derived from travel
    /// distance so speed stays visually constant regardless of text length.
    /// Default: 42.0.
    pub scroll_speed: f64,

    /// Readability pause for text that fits (or fits without its margin)
    /// once centered. Default: 3000 ms.
    pub pause: Duration,

    /// Visual padding added to the full width in the fits-without-scrolling
    /// test. Default: 24 px.
    pub fit_margin: u32,

    /// Minimum duration of the entry scroll-in. Default: 320 ms.
    pub to_pause_floor: Duration,

    /// Minimum duration of the exit slide. Default: 520 ms.
    pub exit_floor: Duration,

    /// Slack added to the exit duration before the watchdog force-finalizes
    /// the cycle. Default: 220 ms.
    pub watchdog_grace: Duration,

    /// Retry delay when the active entry is still unmeasured at pause entry.
    /// Default: 120 ms.
    pub remeasure_retry: Duration,
}

impl Default for TickerConfig {
    fn default() -> Self {
        Self {
            scroll_speed: 42.0,
            pause: Duration::from_millis(3000),
            fit_margin: 24,
            to_pause_floor: Duration::from_millis(320),
            exit_floor: Duration::from_millis(520),
            watchdog_grace: Duration::from_millis(220),
            remeasure_retry: Duration::from_millis(120),
        }
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// The controller's current stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing in flight; deciding, settled, or awaiting measurement.
    Idle,
    /// Scrolling in from off-strip toward the pause position.
    ToPause,
    /// Holding still so the entry can be read.
    Pause,
    /// Sliding out past the left edge.
    ToExit,
}

/// Which property a surface completion notification is about. Only
/// [`Transform`](TransitionProperty::Transform) drives the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionProperty {
    /// The positional transform the engine animates.
    Transform,
    /// An opacity transition on the same node.
    Opacity,
    /// Any other concurrent animation.
    Other,
}

/// One placement for the surface to apply to the content layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Output {
    /// Horizontal offset of the content layer.
    pub translate_x: f64,
    /// Length of the linear interpolation; zero means place instantly.
    pub duration: Duration,
    /// Index of the entry being placed.
    pub entry_index: usize,
}

/// Work deferred to the next paint opportunity. At most one is queued.
#[derive(Debug, Clone, Copy, PartialEq)]
enum FrameStep {
    /// Unanimated jump to the first entry at the origin after a content
    /// change, so the new text does not fly in from the old position.
    ResetOrigin,
    /// Run the fits/overflows decision for the active entry.
    Decide,
    /// Animate from the off-strip placement to the pause position.
    AnimateToPause { pause_x: f64, duration: Duration },
    /// Animate from the pause position out past the left edge.
    AnimateExit { exit_x: f64, duration: Duration },
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The auto-advancing ticker controller. See the module docs for the
/// state machine; all host-facing methods take `now` so the engine stays
/// deterministic under test.
#[derive(Debug)]
pub struct TickerEngine {
    config: TickerConfig,

    entries: EntrySet,
    signature: u64,
    jump_reference: Option<String>,
    measures: MeasurePool,
    viewport: u32,

    phase: Phase,
    active_index: usize,
    translate_x: f64,
    transition_duration: Duration,
    pending_next_index: Option<usize>,
    cycle_token: u64,

    timers: TimerQueue,
    queued_step: Option<FrameStep>,
    outputs: VecDeque<Output>,
}

impl TickerEngine {
    /// Create an engine with no content and an unknown viewport.
    pub fn new(config: TickerConfig) -> Self {
        Self {
            config,
            entries: EntrySet::default(),
            signature: EntrySet::default().signature(),
            jump_reference: None,
            measures: MeasurePool::new(),
            viewport: 0,
            phase: Phase::Idle,
            active_index: 0,
            translate_x: 0.0,
            transition_duration: Duration::ZERO,
            pending_next_index: None,
            cycle_token: 0,
            timers: TimerQueue::new(),
            queued_step: None,
            outputs: VecDeque::new(),
        }
    }

    // -- inputs ------------------------------------------------------------

    /// Replace the raw content and display mode. A content-signature change
    /// (new text, or a narrow/wide flip) tears the current cycle down and
    /// queues an unanimated jump to the first entry at the origin.
    pub fn set_content(&mut self, content: &SourceContent, mode: DisplayMode, _now: Instant) {
        let entries = EntrySet::derive(content, mode);
        let signature = entries.signature();
        if signature == self.signature {
            return;
        }
        debug!(len = entries.len(), ?mode, "content changed, resetting");
        self.entries = entries;
        self.signature = signature;
        self.jump_reference = content.jump_reference().map(str::to_string);
        self.measures.invalidate_all();

        self.cancel_cycle();
        self.cycle_token += 1;
        self.active_index = 0;
        if self.entries.is_empty() {
            self.translate_x = 0.0;
            self.transition_duration = Duration::ZERO;
            return;
        }
        self.queued_step = Some(FrameStep::ResetOrigin);
    }

    /// Push a new strip width. A change restarts the decision for the entry
    /// presently showing; there is no incremental patching of an in-flight
    /// animation.
    pub fn set_viewport_width(&mut self, width: u32, _now: Instant) {
        if width == self.viewport {
            return;
        }
        trace!(from = self.viewport, to = width, "viewport resized");
        self.viewport = width;
        self.restart_decision();
    }

    /// Record a measurement pushed by the surface. Triggers recomputation
    /// only when the stored value changed and the key belongs to the entry
    /// presently showing.
    pub fn set_measurement(&mut self, key: EntryKey, measurement: Measurement, _now: Instant) {
        if !self.measures.record(key, measurement) {
            return;
        }
        if self.active_entry().is_some_and(|entry| entry.key() == key) {
            trace!(%key, ?measurement, "active entry remeasured");
            self.restart_decision();
        }
    }

    /// Surface notification that an applied transition finished. Only the
    /// transform property is honored; anything else is ignored.
    pub fn transition_finished(&mut self, property: TransitionProperty, now: Instant) {
        if property != TransitionProperty::Transform {
            trace!(?property, "ignoring non-transform completion");
            return;
        }
        match self.phase {
            Phase::ToPause => self.enter_pause(now),
            Phase::ToExit => self.finalize(now),
            Phase::Idle | Phase::Pause => {
                trace!(phase = ?self.phase, "ignoring stale completion");
            }
        }
    }

    /// Execute the queued frame step. The host calls this once per paint
    /// opportunity while [`needs_frame`](Self::needs_frame) is true.
    pub fn frame(&mut self, now: Instant) {
        let Some(step) = self.queued_step.take() else {
            return;
        };
        match step {
            FrameStep::ResetOrigin => {
                self.active_index = 0;
                self.emit(0.0, Duration::ZERO);
                self.queued_step = Some(FrameStep::Decide);
            }
            FrameStep::Decide => self.decide(now),
            FrameStep::AnimateToPause { pause_x, duration } => {
                self.phase = Phase::ToPause;
                self.emit(pause_x, duration);
            }
            FrameStep::AnimateExit { exit_x, duration } => {
                self.emit(exit_x, duration);
            }
        }
    }

    /// Fire due timers against the host's clock.
    pub fn poll(&mut self, now: Instant) {
        for kind in self.timers.fire_due(now) {
            match kind {
                TimerKind::AdvanceAfterPause => self.advance_after_pause(),
                TimerKind::RemeasureRetry => self.enter_pause(now),
                TimerKind::ExitAfterPause => self.begin_exit(now),
                TimerKind::Watchdog => {
                    if self.phase == Phase::ToExit {
                        debug!("completion never arrived, watchdog finalizing");
                        self.finalize(now);
                    }
                }
            }
        }
    }

    /// User activation (click, or Enter/Space while focused). Yields the
    /// navigable reference when one exists; the engine itself neither
    /// navigates nor mutates its own state.
    pub fn activate(&self) -> Option<&str> {
        self.jump_reference.as_deref()
    }

    /// Unmount: cancel every pending timer and queued frame step.
    pub fn teardown(&mut self) {
        self.cancel_cycle();
        self.phase = Phase::Idle;
    }

    // -- outputs -----------------------------------------------------------

    /// Drain the placements produced since the last call, oldest first.
    pub fn drain_outputs(&mut self) -> Vec<Output> {
        self.outputs.drain(..).collect()
    }

    /// Whether a frame step is queued and the host should schedule a paint
    /// opportunity.
    pub fn needs_frame(&self) -> bool {
        self.queued_step.is_some()
    }

    /// Earliest armed timer deadline, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// The entry presently showing, or `None` when all content is empty and
    /// the host should render its placeholder.
    pub fn active_entry(&self) -> Option<&DisplayEntry> {
        self.entries.get(self.safe_index())
    }

    /// Safe active index (reduced modulo the set length).
    pub fn active_index(&self) -> usize {
        self.safe_index()
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Monotone counter bumped on every completed cycle and reset.
    pub fn cycle_token(&self) -> u64 {
        self.cycle_token
    }

    /// Index the in-flight exit will land on, while one is in flight.
    pub fn pending_next_index(&self) -> Option<usize> {
        self.pending_next_index
    }

    /// Current horizontal offset of the content layer.
    pub fn translate_x(&self) -> f64 {
        self.translate_x
    }

    /// Duration of the most recent placement.
    pub fn transition_duration(&self) -> Duration {
        self.transition_duration
    }

    /// The derived entry set.
    pub fn entries(&self) -> &EntrySet {
        &self.entries
    }

    /// Keys the surface still needs to measure.
    pub fn pending_measure_keys(&self) -> Vec<EntryKey> {
        self.measures.pending_keys(&self.entries)
    }

    /// Scheduling counters, for tests asserting cancellation ordering.
    pub fn timer_stats(&self) -> TimerStats {
        self.timers.stats()
    }

    // -- state machine -----------------------------------------------------

    fn safe_index(&self) -> usize {
        self.entries.safe_index(self.active_index)
    }

    fn active_measurement(&self) -> Measurement {
        self.active_entry()
            .map(|entry| self.measures.get(entry.key()))
            .unwrap_or(Measurement::EMPTY)
    }

    /// Cancel everything belonging to the current cycle. Always the first
    /// action of a recomputation or teardown, so nothing stale can fire
    /// after the new cycle starts.
    fn cancel_cycle(&mut self) {
        self.timers.cancel_all();
        self.queued_step = None;
        self.pending_next_index = None;
    }

    /// Restart the decision for the entry presently showing (viewport or
    /// measurement change). A queued content reset already leads into a
    /// fresh decision and takes precedence.
    fn restart_decision(&mut self) {
        if self.queued_step == Some(FrameStep::ResetOrigin) {
            return;
        }
        self.cancel_cycle();
        self.phase = Phase::Idle;
        if !self.entries.is_empty() {
            self.queued_step = Some(FrameStep::Decide);
        }
    }

    fn emit(&mut self, translate_x: f64, duration: Duration) {
        self.translate_x = translate_x;
        self.transition_duration = duration;
        self.outputs.push_back(Output {
            translate_x,
            duration,
            entry_index: self.safe_index(),
        });
    }

    /// Duration to travel `distance` pixels at the configured speed, floored.
    fn scroll_duration(&self, distance: f64, floor: Duration) -> Duration {
        let speed = self.config.scroll_speed;
        if !(speed > 0.0) || !distance.is_finite() {
            return floor;
        }
        let ms = (distance.abs() / speed * 1000.0).round() as u64;
        floor.max(Duration::from_millis(ms))
    }

    /// The fits/overflows decision, run fresh at the start of every cycle.
    fn decide(&mut self, now: Instant) {
        let len = self.entries.len();
        let Some(entry) = self.entries.get(self.safe_index()) else {
            return;
        };
        let key = entry.key();
        let measurement = self.measures.get(key);
        if !measurement.is_ready() || self.viewport == 0 {
            // Not measured yet; the measurement push re-runs the decision.
            trace!(%key, "deferring decision until measured");
            return;
        }

        let viewport = f64::from(self.viewport);
        let full = f64::from(measurement.full_width);

        if measurement.full_width + self.config.fit_margin <= self.viewport {
            // Fits: center instantly.
            self.emit((viewport - full) / 2.0, Duration::ZERO);
            if len == 1 {
                // Shown statically until an external change retriggers us.
                self.phase = Phase::Idle;
                debug!(%key, "entry fits, settled");
            } else {
                self.phase = Phase::Pause;
                self.timers
                    .arm(TimerKind::AdvanceAfterPause, now + self.config.pause);
                debug!(%key, "entry fits, pausing before advance");
            }
        } else {
            // Overflows: place off-strip this frame, animate next frame.
            // Anchor the pause on the first word so the reader always sees a
            // legible token even though the full text cannot fit.
            let start_x = viewport;
            let pause_x = (viewport - f64::from(measurement.first_word_width)) / 2.0;
            let duration = self.scroll_duration(start_x - pause_x, self.config.to_pause_floor);
            self.emit(start_x, Duration::ZERO);
            self.queued_step = Some(FrameStep::AnimateToPause { pause_x, duration });
            debug!(%key, ?duration, "entry overflows, scrolling in");
        }
    }

    /// The scroll-in finished: hold still, then schedule the exit. Text that
    /// still overflows gets no extra pause; it already showed itself by
    /// scrolling.
    fn enter_pause(&mut self, now: Instant) {
        self.phase = Phase::Pause;
        let measurement = self.active_measurement();
        if !measurement.is_ready() {
            self.timers
                .arm(TimerKind::RemeasureRetry, now + self.config.remeasure_retry);
            return;
        }
        // Overflow is rechecked without the fit margin here, deliberately.
        let pause = if measurement.full_width > self.viewport {
            Duration::ZERO
        } else {
            self.config.pause
        };
        self.timers.arm(TimerKind::ExitAfterPause, now + pause);
    }

    /// Compute the exit slide and arm the watchdog that guarantees the cycle
    /// finalizes even if the surface never reports completion.
    fn begin_exit(&mut self, now: Instant) {
        let len = self.entries.len();
        if len == 0 {
            return;
        }
        let measurement = self.active_measurement();
        let exit_x = -f64::from(measurement.full_width);
        let next_index = if len > 1 {
            (self.safe_index() + 1) % len
        } else {
            self.safe_index()
        };
        let duration = self.scroll_duration(self.translate_x - exit_x, self.config.exit_floor);

        self.phase = Phase::ToExit;
        self.pending_next_index = Some(next_index);
        self.queued_step = Some(FrameStep::AnimateExit { exit_x, duration });
        self.timers
            .arm(TimerKind::Watchdog, now + duration + self.config.watchdog_grace);
        debug!(?duration, next_index, "exiting");
    }

    /// Close the cycle and hand off to the next entry.
    fn finalize(&mut self, _now: Instant) {
        self.timers.cancel_all();
        self.phase = Phase::Idle;
        if let Some(next) = self.pending_next_index.take() {
            self.active_index = next;
        }
        self.cycle_token += 1;
        self.queued_step = Some(FrameStep::Decide);
        debug!(
            active = self.active_index,
            cycle = self.cycle_token,
            "cycle finalized"
        );
    }

    /// Fixed pause of a fitting entry ended: hard cut to the next entry, no
    /// exit slide.
    fn advance_after_pause(&mut self) {
        let len = self.entries.len();
        if len == 0 {
            return;
        }
        self.timers.cancel_all();
        self.active_index = (self.safe_index() + 1) % len;
        self.cycle_token += 1;
        self.phase = Phase::Idle;
        self.queued_step = Some(FrameStep::Decide);
        debug!(active = self.active_index, "hard-cut advance");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const MS_120: Duration = Duration::from_millis(120);
    const PAUSE: Duration = Duration::from_millis(3000);

    fn verse(text: &str) -> SourceContent {
        SourceContent {
            verse_reference: Some(text.to_string()),
            ..SourceContent::default()
        }
    }

    fn verse_and_title(v: &str, t: &str) -> SourceContent {
        SourceContent {
            verse_reference: Some(v.to_string()),
            topic_title: Some(t.to_string()),
            ..SourceContent::default()
        }
    }

    fn measured(full: u32, first: u32) -> Measurement {
        Measurement {
            full_width: full,
            first_word_width: first,
        }
    }

    /// Engine with content loaded, viewport set, and the content reset frame
    /// already executed, left one frame away from its first decision.
    fn engine_at_decide(
        content: &SourceContent,
        viewport: u32,
        now: Instant,
    ) -> TickerEngine {
        let mut engine = TickerEngine::new(TickerConfig::default());
        engine.set_viewport_width(viewport, now);
        engine.set_content(content, DisplayMode::Narrow, now);
        engine.frame(now); // ResetOrigin
        engine.drain_outputs();
        engine
    }

    // ---- Decision: fits ----

    #[test]
    fn fitting_singleton_centers_once_and_settles() {
        let now = Instant::now();
        let mut engine = engine_at_decide(&verse("John 3:16"), 300, now);
        engine.set_measurement(EntryKey::Verse, measured(80, 40), now);
        engine.frame(now);

        let outputs = engine.drain_outputs();
        assert_eq!(
            outputs,
            vec![Output {
                translate_x: 110.0,
                duration: Duration::ZERO,
                entry_index: 0,
            }]
        );
        assert_eq!(engine.phase(), Phase::Idle);
        assert!(!engine.needs_frame());
        assert_eq!(engine.next_deadline(), None);

        // Nothing further, ever, absent an external change.
        engine.poll(now + Duration::from_secs(600));
        engine.frame(now + Duration::from_secs(600));
        assert!(engine.drain_outputs().is_empty());
    }

    #[test]
    fn unmeasured_entry_defers_decision() {
        let now = Instant::now();
        let mut engine = engine_at_decide(&verse("John 3:16"), 300, now);
        engine.frame(now); // decide with no measurement
        assert!(engine.drain_outputs().is_empty());
        assert!(!engine.needs_frame());

        // The measurement push requeues the decision.
        engine.set_measurement(EntryKey::Verse, measured(80, 40), now);
        assert!(engine.needs_frame());
        engine.frame(now);
        assert_eq!(engine.drain_outputs()[0].translate_x, 110.0);
    }

    #[test]
    fn fitting_pair_pauses_then_hard_cuts() {
        let now = Instant::now();
        let mut engine = engine_at_decide(&verse_and_title("John 3:16", "Faith"), 300, now);
        engine.set_measurement(EntryKey::Verse, measured(80, 40), now);
        engine.set_measurement(EntryKey::Title, measured(60, 60), now);
        engine.frame(now);
        assert_eq!(engine.phase(), Phase::Pause);
        assert_eq!(engine.next_deadline(), Some(now + PAUSE));
        let token = engine.cycle_token();
        engine.drain_outputs();

        engine.poll(now + PAUSE);
        assert_eq!(engine.active_index(), 1);
        assert_eq!(engine.cycle_token(), token + 1);
        assert_eq!(engine.phase(), Phase::Idle);

        // Hard cut: the next output is the second entry's placement, with no
        // exit slide in between.
        engine.frame(now + PAUSE);
        let outputs = engine.drain_outputs();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].entry_index, 1);
        assert_eq!(outputs[0].translate_x, 120.0); // (300 - 60) / 2
        assert_eq!(outputs[0].duration, Duration::ZERO);
    }

    // ---- Decision: overflows ----

    /// Walk an overflowing entry from decision to the exit animation.
    fn run_overflow_to_exit(
        engine: &mut TickerEngine,
        now: Instant,
    ) -> (Vec<Output>, Instant) {
        engine.frame(now); // decide: off-strip placement
        let mut outputs = engine.drain_outputs();
        engine.frame(now); // animate to pause
        outputs.extend(engine.drain_outputs());
        let scroll_in = outputs.last().expect("scroll-in output").duration;

        let arrived = now + scroll_in;
        engine.transition_finished(TransitionProperty::Transform, arrived);
        let pause_over = engine.next_deadline().expect("pause timer");
        engine.poll(pause_over);
        engine.frame(pause_over);
        outputs.extend(engine.drain_outputs());
        (outputs, pause_over)
    }

    #[test]
    fn overflow_singleton_scrolls_pauses_and_exits() {
        let now = Instant::now();
        let mut engine = engine_at_decide(&verse("a long overflowing line"), 300, now);
        engine.set_measurement(EntryKey::Verse, measured(400, 60), now);
        let (outputs, _) = run_overflow_to_exit(&mut engine, now);

        // Off-strip placement, scroll-in, exit.
        assert_eq!(outputs.len(), 3);
        assert_eq!(outputs[0].translate_x, 300.0);
        assert_eq!(outputs[0].duration, Duration::ZERO);
        assert_eq!(outputs[1].translate_x, 120.0); // (300 - 60) / 2
        assert_eq!(outputs[1].duration, Duration::from_millis(4286)); // 180 px at 42 px/s
        assert_eq!(outputs[2].translate_x, -400.0);
        assert_eq!(outputs[2].duration, Duration::from_millis(12381)); // 520 px at 42 px/s
        assert_eq!(engine.phase(), Phase::ToExit);
        assert_eq!(engine.pending_next_index(), Some(0)); // singleton loops onto itself
    }

    #[test]
    fn overflowing_text_gets_no_extra_pause() {
        let now = Instant::now();
        let mut engine = engine_at_decide(&verse("a long overflowing line"), 300, now);
        engine.set_measurement(EntryKey::Verse, measured(400, 60), now);
        engine.frame(now);
        engine.frame(now);
        engine.drain_outputs();

        engine.transition_finished(TransitionProperty::Transform, now);
        assert_eq!(engine.phase(), Phase::Pause);
        assert_eq!(engine.next_deadline(), Some(now)); // pause of zero
    }

    #[test]
    fn slack_window_text_pauses_full_duration() {
        // 290 + 24 > 300 forces the scroll branch, but 290 <= 300 on the
        // margin-free recheck, so the pause is the full 3 s.
        let now = Instant::now();
        let mut engine = engine_at_decide(&verse("slack window text"), 300, now);
        engine.set_measurement(EntryKey::Verse, measured(290, 60), now);
        engine.frame(now);
        engine.frame(now);
        engine.drain_outputs();

        engine.transition_finished(TransitionProperty::Transform, now);
        assert_eq!(engine.next_deadline(), Some(now + PAUSE));
    }

    #[test]
    fn completion_finalizes_exit_and_redecides() {
        let now = Instant::now();
        let mut engine = engine_at_decide(&verse("a long overflowing line"), 300, now);
        engine.set_measurement(EntryKey::Verse, measured(400, 60), now);
        let (_, at) = run_overflow_to_exit(&mut engine, now);
        let token = engine.cycle_token();

        engine.transition_finished(TransitionProperty::Transform, at);
        assert_eq!(engine.phase(), Phase::Idle);
        assert_eq!(engine.active_index(), 0);
        assert_eq!(engine.pending_next_index(), None);
        assert_eq!(engine.cycle_token(), token + 1);
        assert!(engine.needs_frame()); // fresh decision queued
        assert_eq!(engine.next_deadline(), None); // watchdog canceled

        // The loop repeats from the off-strip placement.
        engine.frame(at);
        assert_eq!(engine.drain_outputs()[0].translate_x, 300.0);
    }

    #[test]
    fn unmeasured_at_pause_entry_retries() {
        let now = Instant::now();
        let mut engine = engine_at_decide(&verse("a long overflowing line"), 300, now);
        engine.set_measurement(EntryKey::Verse, measured(400, 60), now);
        engine.frame(now);
        engine.frame(now);
        engine.drain_outputs();
        assert_eq!(engine.phase(), Phase::ToPause);

        // The off-screen duplicate's width reads 0 right as the scroll-in
        // completes (e.g. the duplicate was mid-replacement).
        engine.measures.invalidate_all();
        engine.transition_finished(TransitionProperty::Transform, now);
        assert_eq!(engine.phase(), Phase::Pause);
        assert_eq!(engine.next_deadline(), Some(now + MS_120));

        // Still unmeasured at the first retry: another retry is armed.
        engine.poll(now + MS_120);
        assert_eq!(engine.next_deadline(), Some(now + MS_120 * 2));

        // Width is back by the second retry: the pause proceeds to the exit.
        engine.measures.record(EntryKey::Verse, measured(400, 60));
        engine.poll(now + MS_120 * 2);
        assert_eq!(engine.next_deadline(), Some(now + MS_120 * 2)); // overflow: zero pause
        engine.poll(now + MS_120 * 2);
        assert_eq!(engine.phase(), Phase::ToExit);
    }

    // ---- Watchdog ----

    #[test]
    fn watchdog_finalizes_when_completion_is_lost() {
        let now = Instant::now();
        let mut engine = engine_at_decide(&verse_and_title("long overflowing verse", "t"), 300, now);
        engine.set_measurement(EntryKey::Verse, measured(400, 60), now);
        engine.set_measurement(EntryKey::Title, measured(60, 60), now);
        let (outputs, at) = run_overflow_to_exit(&mut engine, now);
        let exit_duration = outputs.last().unwrap().duration;
        let token = engine.cycle_token();

        // No completion ever arrives.
        let deadline = at + exit_duration + Duration::from_millis(220);
        assert_eq!(engine.next_deadline(), Some(deadline));
        engine.poll(deadline);
        assert_eq!(engine.phase(), Phase::Idle);
        assert_eq!(engine.active_index(), 1);
        assert_eq!(engine.cycle_token(), token + 1);
    }

    #[test]
    fn late_completion_after_watchdog_is_ignored() {
        let now = Instant::now();
        let mut engine = engine_at_decide(&verse("a long overflowing line"), 300, now);
        engine.set_measurement(EntryKey::Verse, measured(400, 60), now);
        let (outputs, at) = run_overflow_to_exit(&mut engine, now);
        let deadline = at + outputs.last().unwrap().duration + Duration::from_millis(220);
        engine.poll(deadline);
        let token = engine.cycle_token();

        engine.transition_finished(TransitionProperty::Transform, deadline);
        assert_eq!(engine.cycle_token(), token); // no double finalize
    }

    // ---- Notification filtering ----

    #[test]
    fn non_transform_completions_are_ignored() {
        let now = Instant::now();
        let mut engine = engine_at_decide(&verse("a long overflowing line"), 300, now);
        engine.set_measurement(EntryKey::Verse, measured(400, 60), now);
        engine.frame(now);
        engine.frame(now);
        assert_eq!(engine.phase(), Phase::ToPause);

        engine.transition_finished(TransitionProperty::Opacity, now);
        engine.transition_finished(TransitionProperty::Other, now);
        assert_eq!(engine.phase(), Phase::ToPause);
    }

    #[test]
    fn completion_while_idle_is_ignored() {
        let now = Instant::now();
        let mut engine = engine_at_decide(&verse("John 3:16"), 300, now);
        engine.set_measurement(EntryKey::Verse, measured(80, 40), now);
        engine.frame(now);
        let token = engine.cycle_token();
        engine.transition_finished(TransitionProperty::Transform, now);
        assert_eq!(engine.phase(), Phase::Idle);
        assert_eq!(engine.cycle_token(), token);
    }

    // ---- Reset and recomputation ----

    #[test]
    fn content_change_resets_to_origin() {
        let now = Instant::now();
        let mut engine = engine_at_decide(&verse_and_title("John 3:16", "Faith"), 300, now);
        engine.set_measurement(EntryKey::Verse, measured(80, 40), now);
        engine.set_measurement(EntryKey::Title, measured(60, 60), now);
        engine.frame(now);
        engine.poll(now + PAUSE); // advance to index 1
        assert_eq!(engine.active_index(), 1);
        engine.drain_outputs();

        // Replace [verse, title] with [title] only.
        let replacement = SourceContent {
            topic_title: Some("Hope".to_string()),
            ..SourceContent::default()
        };
        engine.set_content(&replacement, DisplayMode::Narrow, now + PAUSE);
        assert_eq!(engine.next_deadline(), None); // everything canceled

        engine.frame(now + PAUSE);
        let outputs = engine.drain_outputs();
        assert_eq!(
            outputs,
            vec![Output {
                translate_x: 0.0,
                duration: Duration::ZERO,
                entry_index: 0,
            }]
        );
        assert_eq!(engine.active_index(), 0);
        assert_eq!(engine.active_entry().unwrap().text(), "Hope");
        assert_eq!(engine.phase(), Phase::Idle);
    }

    #[test]
    fn unchanged_content_does_not_reset() {
        let now = Instant::now();
        let mut engine = engine_at_decide(&verse("John 3:16"), 300, now);
        engine.set_measurement(EntryKey::Verse, measured(80, 40), now);
        engine.frame(now);
        engine.drain_outputs();
        let token = engine.cycle_token();

        engine.set_content(&verse("John 3:16"), DisplayMode::Narrow, now);
        assert_eq!(engine.cycle_token(), token);
        assert!(!engine.needs_frame());
    }

    #[test]
    fn mode_flip_resets_and_invalidates_measurements() {
        let now = Instant::now();
        let content = verse_and_title("John 3:16", "Faith");
        let mut engine = engine_at_decide(&content, 300, now);
        engine.set_measurement(EntryKey::Verse, measured(80, 40), now);

        engine.set_content(&content, DisplayMode::Wide, now);
        assert_eq!(engine.entries().len(), 1);
        // The verse width measured in narrow mode is gone; only the combined
        // entry is left to measure.
        assert_eq!(engine.pending_measure_keys(), vec![EntryKey::Combined]);
        assert_eq!(engine.active_entry().unwrap().text(), "John 3:16 | Faith");
    }

    #[test]
    fn resize_restarts_without_origin_jump() {
        let now = Instant::now();
        let mut engine = engine_at_decide(&verse_and_title("John 3:16", "Faith"), 300, now);
        engine.set_measurement(EntryKey::Verse, measured(80, 40), now);
        engine.set_measurement(EntryKey::Title, measured(60, 60), now);
        engine.frame(now);
        engine.poll(now + PAUSE); // active index 1
        engine.frame(now + PAUSE);
        engine.drain_outputs();

        engine.set_viewport_width(500, now + PAUSE);
        assert_eq!(engine.active_index(), 1); // same entry, fresh sequence
        assert_eq!(engine.next_deadline(), None);
        engine.frame(now + PAUSE);
        let outputs = engine.drain_outputs();
        assert_eq!(outputs[0].entry_index, 1);
        assert_eq!(outputs[0].translate_x, 220.0); // (500 - 60) / 2
    }

    #[test]
    fn stale_timers_cannot_outlive_a_recomputation() {
        let now = Instant::now();
        let mut engine = engine_at_decide(&verse_and_title("John 3:16", "Faith"), 300, now);
        engine.set_measurement(EntryKey::Verse, measured(80, 40), now);
        engine.set_measurement(EntryKey::Title, measured(60, 60), now);
        engine.frame(now); // Pause timer armed for entry 0

        let before = engine.timer_stats();
        engine.set_viewport_width(400, now);
        let after = engine.timer_stats();
        assert_eq!(after.canceled, before.canceled + 1);
        assert_eq!(after.armed, before.armed); // cancellation precedes re-arming

        // The old pause timer must never fire: no advance happens.
        engine.poll(now + PAUSE * 2);
        assert_eq!(engine.active_index(), 0);
    }

    #[test]
    fn measurement_for_inactive_entry_does_not_recompute() {
        let now = Instant::now();
        let mut engine = engine_at_decide(&verse_and_title("John 3:16", "Faith"), 300, now);
        engine.set_measurement(EntryKey::Verse, measured(80, 40), now);
        engine.frame(now);
        engine.drain_outputs();
        assert_eq!(engine.phase(), Phase::Pause);

        engine.set_measurement(EntryKey::Title, measured(60, 60), now);
        assert_eq!(engine.phase(), Phase::Pause); // still holding entry 0
        assert!(!engine.needs_frame());
    }

    // ---- Empty content, activation, teardown ----

    #[test]
    fn empty_content_idles_with_no_entry() {
        let now = Instant::now();
        let mut engine = TickerEngine::new(TickerConfig::default());
        engine.set_viewport_width(300, now);
        engine.set_content(&SourceContent::default(), DisplayMode::Narrow, now);
        assert!(engine.active_entry().is_none());
        assert!(!engine.needs_frame());
        assert!(engine.drain_outputs().is_empty());
    }

    #[test]
    fn clearing_content_tears_the_cycle_down() {
        let now = Instant::now();
        let mut engine = engine_at_decide(&verse("John 3:16"), 300, now);
        engine.set_measurement(EntryKey::Verse, measured(80, 40), now);
        engine.frame(now);

        engine.set_content(&SourceContent::default(), DisplayMode::Narrow, now);
        assert!(engine.active_entry().is_none());
        assert_eq!(engine.translate_x(), 0.0);
        assert!(!engine.needs_frame());
    }

    #[test]
    fn activation_carries_the_verse_reference() {
        let now = Instant::now();
        let mut engine = TickerEngine::new(TickerConfig::default());
        engine.set_content(&verse("John 3:16"), DisplayMode::Narrow, now);
        assert_eq!(engine.activate(), Some("John 3:16"));

        let no_verse = SourceContent {
            topic_title: Some("Faith".to_string()),
            ..SourceContent::default()
        };
        engine.set_content(&no_verse, DisplayMode::Narrow, now);
        assert_eq!(engine.activate(), None);
    }

    #[test]
    fn teardown_cancels_everything() {
        let now = Instant::now();
        let mut engine = engine_at_decide(&verse_and_title("John 3:16", "Faith"), 300, now);
        engine.set_measurement(EntryKey::Verse, measured(80, 40), now);
        engine.frame(now);
        assert!(engine.next_deadline().is_some());

        engine.teardown();
        assert_eq!(engine.next_deadline(), None);
        assert!(!engine.needs_frame());
        engine.poll(now + PAUSE);
        assert_eq!(engine.active_index(), 0);
    }

    // ---- Speed invariant ----

    proptest! {
        /// Scroll durations scale linearly with travel distance at 42 px/s,
        /// within rounding and the stated floors.
        #[test]
        fn durations_follow_the_speed_constant(
            full in 325u32..4000,
            first in 1u32..200,
        ) {
            let now = Instant::now();
            let viewport = 300u32;
            let mut engine = engine_at_decide(&verse("wide text"), viewport, now);
            engine.set_measurement(EntryKey::Verse, measured(full, first), now);
            engine.frame(now);
            engine.frame(now);
            let outputs = engine.drain_outputs();

            let start_x = f64::from(viewport);
            let pause_x = (start_x - f64::from(first)) / 2.0;
            let expect_in = ((start_x - pause_x).abs() / 42.0 * 1000.0).round().max(320.0);
            prop_assert_eq!(outputs[1].duration, Duration::from_millis(expect_in as u64));

            engine.transition_finished(TransitionProperty::Transform, now);
            let pause_over = engine.next_deadline().unwrap();
            engine.poll(pause_over);
            engine.frame(pause_over);
            let exit = engine.drain_outputs();
            let expect_out =
                ((pause_x + f64::from(full)).abs() / 42.0 * 1000.0).round().max(520.0);
            prop_assert_eq!(exit[0].duration, Duration::from_millis(expect_out as u64));
        }
    }

    #[test]
    fn tiny_travel_hits_the_duration_floors() {
        let now = Instant::now();
        // Viewport 20: travel to pause is (20 + first) / 2 ≈ 10 px → 238 ms
        // raw, floored to 320 ms.
        let mut engine = engine_at_decide(&verse("xy"), 20, now);
        engine.set_measurement(EntryKey::Verse, measured(30, 1), now);
        engine.frame(now);
        engine.frame(now);
        let outputs = engine.drain_outputs();
        assert_eq!(outputs[1].duration, Duration::from_millis(320));
    }
}
