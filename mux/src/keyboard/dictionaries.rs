// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Built-in keyboard layouts.
//!
//! `enhanced` is the 122-key layout most later terminals (3180, 347x, 3488)
//! ship with; `typewriter` is the reduced 5251/5291 data-entry board, which
//! has no Alt key and no PF keys. Scancode values follow the make/break
//! convention: break code = make code | 0x80.

use std::sync::LazyLock;

use super::{KeySlot, ScancodeDictionary};

const ESC: u8 = 0x1B;

// Make codes shared by both layouts.
pub const SC_1: u8 = 0x11;
pub const SC_E: u8 = 0x23;
pub const SC_SPACE: u8 = 0x50;
pub const SC_ENTER: u8 = 0x51;
pub const SC_BACKSPACE: u8 = 0x52;
pub const SC_TAB: u8 = 0x53;
pub const SC_LSHIFT: u8 = 0x54;
pub const SC_ALT: u8 = 0x56;
pub const SC_RSHIFT: u8 = 0x57;
pub const SC_CTRL: u8 = 0x58;
pub const SC_UP: u8 = 0x60;
pub const SC_DOWN: u8 = 0x61;
pub const SC_RIGHT: u8 = 0x62;
pub const SC_LEFT: u8 = 0x63;
pub const SC_HOME: u8 = 0x64;
pub const SC_CAPS_LOCK: u8 = 0x7E;

pub const SC_LSHIFT_BREAK: u8 = SC_LSHIFT | 0x80;
pub const SC_RSHIFT_BREAK: u8 = SC_RSHIFT | 0x80;
pub const SC_CTRL_BREAK: u8 = SC_CTRL | 0x80;

/// Letter key: shift uppercases, ctrl produces the C0 control.
const fn letter(ch: u8) -> KeySlot {
    KeySlot {
        base: ch,
        shifted: ch - 0x20,
        alted: 0,
        controlled: ch & 0x1F,
        escape_tail: 0,
    }
}

/// Two-face key (digits, punctuation).
const fn pair(base: u8, shifted: u8) -> KeySlot {
    KeySlot {
        base,
        shifted,
        alted: 0,
        controlled: 0,
        escape_tail: 0,
    }
}

/// Key that produces the same byte regardless of shift.
const fn plain(ch: u8) -> KeySlot { pair(ch, ch) }

/// Key that emits `ESC tail` in every unmodified combination.
const fn esc_seq(tail: u8) -> KeySlot {
    KeySlot {
        base: ESC,
        shifted: ESC,
        alted: ESC,
        controlled: 0,
        escape_tail: tail,
    }
}

#[rustfmt::skip]
const COMMON_KEYS: &[(u8, KeySlot)] = &[
    // Digit row.
    (0x11, pair(b'1', b'!')), (0x12, pair(b'2', b'@')), (0x13, pair(b'3', b'#')),
    (0x14, pair(b'4', b'$')), (0x15, pair(b'5', b'%')), (0x16, pair(b'6', b'^')),
    (0x17, pair(b'7', b'&')), (0x18, pair(b'8', b'*')), (0x19, pair(b'9', b'(')),
    (0x1A, pair(b'0', b')')), (0x1B, pair(b'-', b'_')), (0x1C, pair(b'=', b'+')),
    // Top letter row.
    (0x21, letter(b'q')), (0x22, letter(b'w')), (SC_E, letter(b'e')),
    (0x24, letter(b'r')), (0x25, letter(b't')), (0x26, letter(b'y')),
    (0x27, letter(b'u')), (0x28, letter(b'i')), (0x29, letter(b'o')),
    (0x2A, letter(b'p')), (0x2B, pair(b'[', b'{')), (0x2C, pair(b']', b'}')),
    // Home row.
    (0x31, letter(b'a')), (0x32, letter(b's')), (0x33, letter(b'd')),
    (0x34, letter(b'f')), (0x35, letter(b'g')), (0x36, letter(b'h')),
    (0x37, letter(b'j')), (0x38, letter(b'k')), (0x39, letter(b'l')),
    (0x3A, pair(b';', b':')), (0x3B, pair(b'\'', b'"')), (0x3C, pair(b'\\', b'|')),
    // Bottom row.
    (0x41, letter(b'z')), (0x42, letter(b'x')), (0x43, letter(b'c')),
    (0x44, letter(b'v')), (0x45, letter(b'b')), (0x46, letter(b'n')),
    (0x47, letter(b'm')), (0x48, pair(b',', b'<')), (0x49, pair(b'.', b'>')),
    (0x4A, pair(b'/', b'?')), (0x4B, pair(b'`', b'~')),
    // Controls and whitespace.
    (SC_SPACE, plain(b' ')),
    (SC_ENTER, plain(0x0D)),
    (SC_BACKSPACE, plain(0x7F)),
    (SC_TAB, plain(0x09)),
    // Cursor block: VT52 sequences, suppressed under ctrl.
    (SC_UP, esc_seq(b'A')),
    (SC_DOWN, esc_seq(b'B')),
    (SC_RIGHT, esc_seq(b'C')),
    (SC_LEFT, esc_seq(b'D')),
    (SC_HOME, esc_seq(b'H')),
];

/// PF1–PF4 on the enhanced board map to the VT52 function keys.
#[rustfmt::skip]
const PF_KEYS: &[(u8, KeySlot)] = &[
    (0x68, esc_seq(b'P')),
    (0x69, esc_seq(b'Q')),
    (0x6A, esc_seq(b'R')),
    (0x6B, esc_seq(b'S')),
];

fn build_slots(groups: &[&[(u8, KeySlot)]]) -> [KeySlot; 256] {
    let mut slots = [KeySlot::EMPTY; 256];
    for group in groups {
        for &(code, slot) in *group {
            debug_assert!(slots[code as usize].is_empty(), "duplicate scancode {code:#04x}");
            slots[code as usize] = slot;
        }
    }
    slots
}

pub static ENHANCED: LazyLock<ScancodeDictionary> =
    LazyLock::new(|| ScancodeDictionary {
        name: "enhanced",
        slots: build_slots(&[COMMON_KEYS, PF_KEYS]),
        shift_press: &[SC_LSHIFT, SC_RSHIFT],
        shift_release: &[SC_LSHIFT_BREAK, SC_RSHIFT_BREAK],
        ctrl_press: &[SC_CTRL],
        ctrl_release: &[SC_CTRL_BREAK],
        // Alt reports no break code on this board: sticky one-shot.
        alt_press: &[SC_ALT],
        alt_release: &[],
        caps_lock: SC_CAPS_LOCK,
    });

pub static TYPEWRITER: LazyLock<ScancodeDictionary> =
    LazyLock::new(|| ScancodeDictionary {
        name: "typewriter",
        slots: build_slots(&[COMMON_KEYS]),
        shift_press: &[SC_LSHIFT, SC_RSHIFT],
        shift_release: &[SC_LSHIFT_BREAK, SC_RSHIFT_BREAK],
        ctrl_press: &[SC_CTRL],
        ctrl_release: &[SC_CTRL_BREAK],
        // No Alt key on the data-entry board.
        alt_press: &[],
        alt_release: &[],
        caps_lock: SC_CAPS_LOCK,
    });
