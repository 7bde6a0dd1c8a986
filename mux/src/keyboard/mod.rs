// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Scancode decoding: 5250 keyboard scancodes → ASCII byte sequences.
//!
//! A 5250 keyboard does not send characters; it sends raw scancodes, make
//! and break, and the host owns the layout. Each supported layout is a
//! [`ScancodeDictionary`]: a flat array of 256 fixed-shape slots plus the
//! scancode sets that act as modifiers. The per-session [`KeyboardState`]
//! holds the modifier latches and turns one scancode at a time into zero,
//! one, or two bytes for the PTY.

pub mod decoder;
pub mod dictionaries;

pub use decoder::KeyboardState;
pub use dictionaries::{ENHANCED, TYPEWRITER};

/// One dictionary slot: the byte each modifier combination produces.
///
/// A zero entry means "nothing" — either the combination is suppressed or
/// the scancode is unmapped. A slot whose chosen byte is `ESC` and whose
/// `escape_tail` is nonzero emits the two-byte sequence `ESC tail`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeySlot {
    pub base: u8,
    pub shifted: u8,
    pub alted: u8,
    pub controlled: u8,
    pub escape_tail: u8,
}

impl KeySlot {
    pub const EMPTY: KeySlot = KeySlot {
        base: 0,
        shifted: 0,
        alted: 0,
        controlled: 0,
        escape_tail: 0,
    };

    #[must_use]
    pub fn is_empty(&self) -> bool { *self == Self::EMPTY }
}

/// A keyboard layout: 256 slots plus the modifier scancode sets.
///
/// An empty release set marks that modifier as sticky: pressing it arms a
/// one-shot latch that the next non-modifier key consumes, and pressing it
/// again before that disarms it.
pub struct ScancodeDictionary {
    pub name: &'static str,
    slots: [KeySlot; 256],
    pub shift_press: &'static [u8],
    pub shift_release: &'static [u8],
    pub ctrl_press: &'static [u8],
    pub ctrl_release: &'static [u8],
    pub alt_press: &'static [u8],
    pub alt_release: &'static [u8],
    pub caps_lock: u8,
}

impl std::fmt::Debug for ScancodeDictionary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScancodeDictionary")
            .field("name", &self.name)
            .finish()
    }
}

impl ScancodeDictionary {
    #[must_use]
    pub fn slot(&self, scancode: u8) -> &KeySlot { &self.slots[scancode as usize] }

    /// Look up a built-in dictionary by CLI name.
    #[must_use]
    pub fn by_name(name: &str) -> Option<&'static ScancodeDictionary> {
        match name {
            "enhanced" => Some(&ENHANCED),
            "typewriter" => Some(&TYPEWRITER),
            _ => None,
        }
    }

    #[must_use]
    pub fn default_dictionary() -> &'static ScancodeDictionary { &ENHANCED }
}
