// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Built-in codepage pair lists.
//!
//! Each list maps (EBCDIC, ASCII) for every code with an ASCII counterpart:
//! the C0 controls the converter cares about plus the full printable set.
//! EBCDIC codes absent here (¢, ¬, ±, the accented letters, ...) have no
//! ASCII rendition and fall back to `?`.

use std::sync::LazyLock;

use super::Codepage;

pub static CP037: LazyLock<Codepage> =
    LazyLock::new(|| Codepage::build("cp037", CP037_PAIRS));

pub static CP285: LazyLock<Codepage> = LazyLock::new(|| {
    // cp285 is cp037 with the currency swap: $ sits at 0x4A and 0x5B holds
    // the pound sign, which has no ASCII counterpart.
    let pairs: Vec<(u8, u8)> = CP037_PAIRS
        .iter()
        .copied()
        .filter(|&(e, _)| e != 0x5B)
        .chain(std::iter::once((0x4A, b'$')))
        .collect();
    Codepage::build("cp285", &pairs)
});

#[rustfmt::skip]
pub(super) const CP037_PAIRS: &[(u8, u8)] = &[
    // Controls.
    (0x00, 0x00), (0x01, 0x01), (0x02, 0x02), (0x03, 0x03),
    (0x05, 0x09), // HT
    (0x07, 0x7F), // DEL
    (0x0B, 0x0B), (0x0C, 0x0C), (0x0D, 0x0D), (0x0E, 0x0E), (0x0F, 0x0F),
    (0x10, 0x10), (0x11, 0x11), (0x12, 0x12), (0x13, 0x13),
    (0x16, 0x08), // BS
    (0x18, 0x18), (0x19, 0x19),
    (0x1C, 0x1C), (0x1D, 0x1D), (0x1E, 0x1E), (0x1F, 0x1F),
    (0x25, 0x0A), // LF
    (0x26, 0x17), // ETB
    (0x27, 0x1B), // ESC
    (0x2D, 0x05), (0x2E, 0x06), (0x2F, 0x07),
    (0x32, 0x16), // SYN
    (0x37, 0x04), // EOT
    (0x3C, 0x14), (0x3D, 0x15),
    (0x3F, 0x1A), // SUB
    // Space and punctuation.
    (0x40, b' '),
    (0x4B, b'.'), (0x4C, b'<'), (0x4D, b'('), (0x4E, b'+'), (0x4F, b'|'),
    (0x50, b'&'),
    (0x5A, b'!'), (0x5B, b'$'), (0x5C, b'*'), (0x5D, b')'), (0x5E, b';'),
    (0x60, b'-'), (0x61, b'/'),
    (0x6B, b','), (0x6C, b'%'), (0x6D, b'_'), (0x6E, b'>'), (0x6F, b'?'),
    (0x79, b'`'), (0x7A, b':'), (0x7B, b'#'), (0x7C, b'@'), (0x7D, b'\''),
    (0x7E, b'='), (0x7F, b'"'),
    // Lowercase letters.
    (0x81, b'a'), (0x82, b'b'), (0x83, b'c'), (0x84, b'd'), (0x85, b'e'),
    (0x86, b'f'), (0x87, b'g'), (0x88, b'h'), (0x89, b'i'),
    (0x91, b'j'), (0x92, b'k'), (0x93, b'l'), (0x94, b'm'), (0x95, b'n'),
    (0x96, b'o'), (0x97, b'p'), (0x98, b'q'), (0x99, b'r'),
    (0xA1, b'~'),
    (0xA2, b's'), (0xA3, b't'), (0xA4, b'u'), (0xA5, b'v'), (0xA6, b'w'),
    (0xA7, b'x'), (0xA8, b'y'), (0xA9, b'z'),
    // Brackets and carets live up in the extended rows.
    (0xB0, b'^'),
    (0xBA, b'['), (0xBB, b']'),
    // Uppercase letters and braces.
    (0xC0, b'{'),
    (0xC1, b'A'), (0xC2, b'B'), (0xC3, b'C'), (0xC4, b'D'), (0xC5, b'E'),
    (0xC6, b'F'), (0xC7, b'G'), (0xC8, b'H'), (0xC9, b'I'),
    (0xD0, b'}'),
    (0xD1, b'J'), (0xD2, b'K'), (0xD3, b'L'), (0xD4, b'M'), (0xD5, b'N'),
    (0xD6, b'O'), (0xD7, b'P'), (0xD8, b'Q'), (0xD9, b'R'),
    (0xE0, b'\\'),
    (0xE2, b'S'), (0xE3, b'T'), (0xE4, b'U'), (0xE5, b'V'), (0xE6, b'W'),
    (0xE7, b'X'), (0xE8, b'Y'), (0xE9, b'Z'),
    // Digits.
    (0xF0, b'0'), (0xF1, b'1'), (0xF2, b'2'), (0xF3, b'3'), (0xF4, b'4'),
    (0xF5, b'5'), (0xF6, b'6'), (0xF7, b'7'), (0xF8, b'8'), (0xF9, b'9'),
];
