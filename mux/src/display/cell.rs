// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Display cells: one character in the terminal's native code plus its
//! attribute flags.

use bitflags::bitflags;

use crate::charset::EBCDIC_SPACE;

bitflags! {
    /// 5250 field attribute bits, packed the way write bursts carry them.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CellAttrs: u8 {
        const BRIGHT       = 0x01;
        const REVERSE      = 0x02;
        const UNDERLINE    = 0x04;
        const BLINK        = 0x08;
        const NONDISPLAY   = 0x10;
        const COLUMN_SEP   = 0x20;
    }
}

/// One screen position: an EBCDIC character and its attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayCell {
    pub ch: u8,
    pub attrs: CellAttrs,
}

impl DisplayCell {
    /// A blank cell with default attributes.
    pub const BLANK: DisplayCell = DisplayCell {
        ch: EBCDIC_SPACE,
        attrs: CellAttrs::empty(),
    };

    #[must_use]
    pub fn new(ch: u8, attrs: CellAttrs) -> Self { Self { ch, attrs } }

    /// A space carrying the given attributes, used by the erase operations.
    #[must_use]
    pub fn blank_with(attrs: CellAttrs) -> Self {
        Self {
            ch: EBCDIC_SPACE,
            attrs,
        }
    }
}

impl Default for DisplayCell {
    fn default() -> Self { Self::BLANK }
}
