#![forbid(unsafe_code)]

//! Entry-set derivation.
//!
//! Raw ticker content (a verse reference, a discussion topic title, and a
//! topic description, each optional) is reduced to an ordered [`EntrySet`] of
//! displayable entries. The derivation is a pure function of the content and
//! the [`DisplayMode`]; it holds no state and has no side effects.
//!
//! In [`DisplayMode::Narrow`] each non-empty field becomes its own entry and
//! the engine rotates through them. In [`DisplayMode::Wide`] the fields
//! collapse into one synthetic `Combined` entry whose text joins the pieces
//! with [`COMBINED_SEPARATOR`], while the original sub-entries are retained
//! in order so a renderer can style each piece and draw its own separators.
//!
//! # Invariants
//!
//! 1. The set is empty only when every source field is empty.
//! 2. Entry order is fixed: verse, title, description.
//! 3. [`EntrySet::signature`] changes whenever any entry's key or text
//!    changes, including the narrow/wide collapse.

use std::fmt;

/// Separator placed between sub-entries of the combined wide-mode entry.
pub const COMBINED_SEPARATOR: &str = " | ";

/// FNV-1a 64-bit offset basis.
const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
/// FNV-1a 64-bit prime.
const FNV_PRIME: u64 = 0x100000001b3;

fn fnv_hash_bytes(hash: &mut u64, bytes: &[u8]) {
    for byte in bytes {
        *hash ^= *byte as u64;
        *hash = hash.wrapping_mul(FNV_PRIME);
    }
}

// ---------------------------------------------------------------------------
// Source content
// ---------------------------------------------------------------------------

/// Raw content the host feeds the ticker. Fields whose trimmed text is empty
/// are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceContent {
    /// Scripture reference, e.g. `"John 3:16"`. Also the navigation target
    /// surfaced on user activation.
    pub verse_reference: Option<String>,
    /// Discussion topic title.
    pub topic_title: Option<String>,
    /// Discussion topic description.
    pub topic_description: Option<String>,
}

impl SourceContent {
    /// The navigable reference carried by activation, when one exists.
    pub fn jump_reference(&self) -> Option<&str> {
        self.verse_reference
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Whether user activation has anywhere to go.
    pub fn can_jump(&self) -> bool {
        self.jump_reference().is_some()
    }

    fn slots(&self) -> impl Iterator<Item = Entry> + '_ {
        [
            (EntryKey::Verse, self.verse_reference.as_deref()),
            (EntryKey::Title, self.topic_title.as_deref()),
            (EntryKey::Description, self.topic_description.as_deref()),
        ]
        .into_iter()
        .filter_map(|(key, text)| {
            let text = text.map(str::trim).filter(|s| !s.is_empty())?;
            Some(Entry {
                key,
                text: text.to_string(),
                style_tag: key.as_str(),
            })
        })
    }
}

/// How the host's strip is currently laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    /// Strip is narrow: entries rotate one at a time.
    Narrow,
    /// Strip is wide: all entries collapse into one combined line.
    Wide,
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// Stable identity of an entry within a cycle, used for measurement lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKey {
    /// Scripture reference slot.
    Verse,
    /// Topic title slot.
    Title,
    /// Topic description slot.
    Description,
    /// The synthetic wide-mode entry.
    Combined,
}

impl EntryKey {
    /// Stable string form of the key.
    pub fn as_str(self) -> &'static str {
        match self {
            EntryKey::Verse => "verse",
            EntryKey::Title => "title",
            EntryKey::Description => "description",
            EntryKey::Combined => "combined",
        }
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One displayable text item. Immutable value; `style_tag` is opaque to the
/// engine and passed through to the renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Identity for measurement lookup.
    pub key: EntryKey,
    /// The text to display.
    pub text: String,
    /// Renderer styling hint.
    pub style_tag: &'static str,
}

/// An entry as the engine displays it: either a single source entry or the
/// wide-mode combination of all of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayEntry {
    /// One source entry shown on its own.
    Single(Entry),
    /// All source entries joined into one line. `text` is the joined form the
    /// surface measures; `parts` keeps the originals for styled rendering.
    Combined {
        /// Sub-entry texts joined with [`COMBINED_SEPARATOR`].
        text: String,
        /// The original sub-entries, in order.
        parts: Vec<Entry>,
    },
}

impl DisplayEntry {
    /// Measurement-lookup key for this entry.
    pub fn key(&self) -> EntryKey {
        match self {
            DisplayEntry::Single(entry) => entry.key,
            DisplayEntry::Combined { .. } => EntryKey::Combined,
        }
    }

    /// The full text the surface renders and measures.
    pub fn text(&self) -> &str {
        match self {
            DisplayEntry::Single(entry) => &entry.text,
            DisplayEntry::Combined { text, .. } => text,
        }
    }

    /// Renderer styling hint for the entry as a whole.
    pub fn style_tag(&self) -> &'static str {
        match self {
            DisplayEntry::Single(entry) => entry.style_tag,
            DisplayEntry::Combined { .. } => EntryKey::Combined.as_str(),
        }
    }

    /// The styled pieces a renderer should draw, in order. A single entry is
    /// its own only piece.
    pub fn parts(&self) -> &[Entry] {
        match self {
            DisplayEntry::Single(entry) => std::slice::from_ref(entry),
            DisplayEntry::Combined { parts, .. } => parts,
        }
    }
}

// ---------------------------------------------------------------------------
// EntrySet
// ---------------------------------------------------------------------------

/// The ordered set of entries currently eligible for display.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntrySet {
    entries: Vec<DisplayEntry>,
}

impl EntrySet {
    /// Derive the entry set for the given content and display mode.
    pub fn derive(content: &SourceContent, mode: DisplayMode) -> Self {
        let slots: Vec<Entry> = content.slots().collect();
        if slots.is_empty() {
            return Self::default();
        }
        let entries = match mode {
            DisplayMode::Narrow => slots.into_iter().map(DisplayEntry::Single).collect(),
            DisplayMode::Wide => {
                let text = slots
                    .iter()
                    .map(|entry| entry.text.as_str())
                    .collect::<Vec<_>>()
                    .join(COMBINED_SEPARATOR);
                vec![DisplayEntry::Combined { text, parts: slots }]
            }
        };
        Self { entries }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set has no entries (all source content empty).
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry at `index`, if present.
    pub fn get(&self, index: usize) -> Option<&DisplayEntry> {
        self.entries.get(index)
    }

    /// Iterate over the entries in display order.
    pub fn iter(&self) -> impl Iterator<Item = &DisplayEntry> {
        self.entries.iter()
    }

    /// Reduce a possibly stale index modulo the set length. Returns 0 for an
    /// empty set so callers can use it unconditionally.
    pub fn safe_index(&self, raw: usize) -> usize {
        if self.entries.is_empty() {
            0
        } else {
            raw % self.entries.len()
        }
    }

    /// Content signature: FNV-1a over every entry's key and text, in order.
    /// Two sets with equal signatures render identically.
    pub fn signature(&self) -> u64 {
        let mut hash = FNV_OFFSET_BASIS;
        for entry in &self.entries {
            fnv_hash_bytes(&mut hash, entry.key().as_str().as_bytes());
            fnv_hash_bytes(&mut hash, &[0x1f]);
            fnv_hash_bytes(&mut hash, entry.text().as_bytes());
            fnv_hash_bytes(&mut hash, &[0x1e]);
        }
        hash
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
