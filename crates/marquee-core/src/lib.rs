#![forbid(unsafe_code)]

//! Headless auto-advancing ticker engine.
//!
//! A fixed-width strip shows short text entries one at a time: each entry
//! enters, pauses, optionally scrolls to reveal overflow, exits, and hands
//! off to the next entry, indefinitely. This crate owns the timing and
//! positional state of that loop and nothing else — no layout, no text
//! rendering, no persistence. The host supplies content, viewport widths,
//! and per-entry measurements; the engine answers with `(translate_x,
//! duration)` placements and the entry to render.
//!
//! # Modules
//!
//! - [`entry`] — pure derivation of the displayable entry set from raw
//!   content and the narrow/wide display mode.
//! - [`measure`] — bookkeeping for widths the surface measures off-screen.
//! - [`viewport`] — latest-wins coalescing of resize event bursts.
//! - [`schedule`] — the deadline queue behind pauses, retries, and the
//!   watchdog.
//! - [`engine`] — the phase state machine tying it all together.
//!
//! # Host contract
//!
//! The engine is a closed-loop controller. The host:
//!
//! 1. pushes inputs ([`TickerEngine::set_content`],
//!    [`TickerEngine::set_viewport_width`],
//!    [`TickerEngine::set_measurement`]) as they change;
//! 2. calls [`TickerEngine::frame`] once per paint opportunity while
//!    [`TickerEngine::needs_frame`] is true — required, because the engine
//!    sequences "place instantly" and "animate" across two paints;
//! 3. applies each drained [`Output`] as a linear timed interpolation and
//!    reports transform completions via
//!    [`TickerEngine::transition_finished`];
//! 4. calls [`TickerEngine::poll`] by [`TickerEngine::next_deadline`].
//!
//! Everything is single-threaded and clock-free: the host's `now` is the
//! only time source, which keeps the whole loop deterministic under test.

pub mod engine;
pub mod entry;
pub mod measure;
pub mod schedule;
pub mod viewport;

pub use engine::{Output, Phase, TickerConfig, TickerEngine, TransitionProperty};
pub use entry::{
    COMBINED_SEPARATOR, DisplayEntry, DisplayMode, Entry, EntryKey, EntrySet, SourceContent,
};
pub use measure::{MeasurePool, Measurement, first_token};
pub use schedule::{TimerKind, TimerQueue, TimerStats};
pub use viewport::{ViewportConfig, ViewportTracker};
