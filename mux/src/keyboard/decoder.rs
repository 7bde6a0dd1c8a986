// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Per-session scancode decoder state machine.

use smallvec::SmallVec;

use super::{KeySlot, ScancodeDictionary};

const ESC: u8 = 0x1B;

/// Up to two bytes come out of one scancode (`ESC` + tail).
pub type DecodedBytes = SmallVec<[u8; 2]>;

#[derive(Debug, Default, Clone, Copy)]
struct Latch {
    active: bool,
    one_shot: bool,
}

impl Latch {
    fn press(&mut self, sticky: bool) {
        if sticky {
            // Sticky modifiers toggle on consecutive presses.
            self.active = !self.active;
            self.one_shot = self.active;
        } else {
            self.active = true;
        }
    }

    fn release(&mut self) {
        self.active = false;
        self.one_shot = false;
    }

    fn consume_one_shot(&mut self) {
        if self.one_shot {
            self.active = false;
            self.one_shot = false;
        }
    }
}

/// Modifier latches plus the active dictionary.
///
/// The decoder is purely a function of its latches and the incoming
/// scancode; it never buffers. ESC-prefixed keys emit both bytes in one
/// call so a poll boundary can never split the pair.
#[derive(Debug)]
pub struct KeyboardState {
    dict: &'static ScancodeDictionary,
    shift: Latch,
    ctrl: Latch,
    alt: Latch,
    caps: bool,
}

impl KeyboardState {
    #[must_use]
    pub fn new(dict: &'static ScancodeDictionary) -> Self {
        Self {
            dict,
            shift: Latch::default(),
            ctrl: Latch::default(),
            alt: Latch::default(),
            caps: false,
        }
    }

    #[must_use]
    pub fn dictionary(&self) -> &'static ScancodeDictionary { self.dict }

    /// True when every modifier latch is clear.
    #[must_use]
    pub fn latches_clear(&self) -> bool {
        !self.shift.active && !self.ctrl.active && !self.alt.active
    }

    /// Feed one raw scancode; returns the bytes to write to the PTY, if any.
    pub fn decode(&mut self, scancode: u8) -> Option<DecodedBytes> {
        let dict = self.dict;

        if dict.shift_press.contains(&scancode) {
            self.shift.press(dict.shift_release.is_empty());
            return None;
        }
        if dict.ctrl_press.contains(&scancode) {
            self.ctrl.press(dict.ctrl_release.is_empty());
            return None;
        }
        if dict.alt_press.contains(&scancode) {
            self.alt.press(dict.alt_release.is_empty());
            return None;
        }
        if dict.shift_release.contains(&scancode) {
            self.shift.release();
            return None;
        }
        if dict.ctrl_release.contains(&scancode) {
            self.ctrl.release();
            return None;
        }
        if dict.alt_release.contains(&scancode) {
            self.alt.release();
            return None;
        }
        if scancode == dict.caps_lock {
            self.caps = !self.caps;
            return None;
        }

        let slot = dict.slot(scancode);
        if slot.is_empty() {
            tracing::debug!(target: "twinax_mux::scancode", scancode, "unknown scancode dropped");
            self.clear_one_shots();
            return None;
        }

        let chosen = self.select(slot);
        self.clear_one_shots();

        match chosen {
            0 => None, // Suppressed combination.
            b if b == ESC && slot.escape_tail != 0 => {
                Some(SmallVec::from_slice(&[ESC, slot.escape_tail]))
            }
            b => Some(SmallVec::from_slice(&[b])),
        }
    }

    /// Slot selection order: ctrl, alt, shift/caps, base.
    ///
    /// Caps lock behaves classically: it inverts shift for letters and is
    /// ignored for everything else, where shift alone decides.
    fn select(&self, slot: &KeySlot) -> u8 {
        if self.ctrl.active && slot.controlled != 0 {
            return slot.controlled;
        }
        if self.alt.active && slot.alted != 0 {
            return slot.alted;
        }
        let upper = if slot.base.is_ascii_alphabetic() {
            self.shift.active ^ self.caps
        } else {
            self.shift.active
        };
        if upper && slot.shifted != 0 {
            slot.shifted
        } else {
            slot.base
        }
    }

    fn clear_one_shots(&mut self) {
        self.shift.consume_one_shot();
        self.ctrl.consume_one_shot();
        self.alt.consume_one_shot();
    }
}
