#![forbid(unsafe_code)]

//! Per-entry measurement bookkeeping.
//!
//! Rendered widths come from an off-screen duplicate of each entry's text
//! drawn with the same style, so real layout metrics are honored without
//! guessing. The surface owns that duplicate; the engine only records what it
//! is told. A width of 0 means "not yet measured" and is never an error —
//! the engine defers and retries instead.
//!
//! [`MeasurePool`] is generation-based: a content change bumps the generation
//! and drops every stored width, so a stale measurement for a reused key can
//! never leak into a new cycle.

use std::collections::HashMap;

use crate::entry::{EntryKey, EntrySet};

/// First whitespace-delimited token of `text`, or `""` when there is none.
/// This is the piece whose rendered width the surface reports as
/// [`Measurement::first_word_width`].
pub fn first_token(text: &str) -> &str {
    text.split_whitespace().next().unwrap_or("")
}

/// Rendered pixel widths of one entry. Zero means "not ready".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Measurement {
    /// Width of the whole text.
    pub full_width: u32,
    /// Width of just the first whitespace-delimited token.
    pub first_word_width: u32,
}

impl Measurement {
    /// The not-yet-measured value.
    pub const EMPTY: Measurement = Measurement {
        full_width: 0,
        first_word_width: 0,
    };

    /// Whether the surface has produced a usable width.
    pub fn is_ready(&self) -> bool {
        self.full_width > 0
    }
}

/// Store of pushed measurements, keyed by entry.
#[derive(Debug, Clone, Default)]
pub struct MeasurePool {
    widths: HashMap<EntryKey, Measurement>,
    generation: u64,
}

impl MeasurePool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a measurement. Returns `true` when the stored value changed.
    pub fn record(&mut self, key: EntryKey, measurement: Measurement) -> bool {
        let previous = self.widths.insert(key, measurement);
        previous != Some(measurement)
    }

    /// Measurement for `key`, or [`Measurement::EMPTY`] when none was pushed.
    pub fn get(&self, key: EntryKey) -> Measurement {
        self.widths.get(&key).copied().unwrap_or(Measurement::EMPTY)
    }

    /// Whether `key` has a usable measurement.
    pub fn is_ready(&self, key: EntryKey) -> bool {
        self.get(key).is_ready()
    }

    /// Drop every stored width and bump the generation. Called on content
    /// changes; widths measured for the old text must not survive them.
    pub fn invalidate_all(&mut self) {
        self.widths.clear();
        self.generation = self.generation.wrapping_add(1);
    }

    /// Current invalidation generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Keys in `entries` the surface still needs to measure.
    pub fn pending_keys(&self, entries: &EntrySet) -> Vec<EntryKey> {
        entries
            .iter()
            .map(|entry| entry.key())
            .filter(|key| !self.is_ready(*key))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
