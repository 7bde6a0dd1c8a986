// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Display controller: the per-session screen model and its VT52 front end.
//!
//! Shell output flows in as ASCII bytes, gets interpreted as VT52, and
//! lands in the regen buffer as EBCDIC cells with attributes. The station
//! engine later turns the accumulated dirty extent into write bursts; the
//! controller itself never talks to the wire.

pub mod cell;
pub mod screen;
pub mod status_line;
pub mod vt52;

use smallvec::SmallVec;

pub use cell::{CellAttrs, DisplayCell};
pub use screen::{CursorPos, DirtySpan, SCREEN_COLS, SCREEN_ROWS, STATUS_ROW, ScreenBuffer};
pub use status_line::StatusLine;
pub use vt52::{Vt52Effect, Vt52Parser};

use crate::{charset::SessionCharset, station::frame::StatusIndicators};

/// The VT52 identify reply (`ESC / K`), sent on the keyboard path.
pub const IDENTIFY_REPLY: [u8; 3] = [0x1B, b'/', b'K'];

#[derive(Debug, Default)]
pub struct DisplayController {
    screen: ScreenBuffer,
    parser: Vt52Parser,
    status: StatusLine,
    keypad_alternate: bool,
    reply: SmallVec<[u8; 8]>,
}

impl DisplayController {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    #[must_use]
    pub fn screen(&self) -> &ScreenBuffer { &self.screen }

    #[must_use]
    pub fn status(&self) -> &StatusLine { &self.status }

    #[must_use]
    pub fn keypad_alternate(&self) -> bool { self.keypad_alternate }

    /// Interpret a chunk of shell output.
    pub fn apply_bytes(&mut self, bytes: &[u8], charset: &SessionCharset) {
        for &byte in bytes {
            match self.parser.feed(byte, &mut self.screen, charset) {
                Some(Vt52Effect::Identify) => {
                    self.reply.extend_from_slice(&IDENTIFY_REPLY);
                }
                Some(Vt52Effect::KeypadAlternate(on)) => self.keypad_alternate = on,
                None => {}
            }
        }
    }

    /// Bytes the terminal side owes the application (identify replies);
    /// drained by the session into the PTY write path.
    pub fn take_reply(&mut self) -> Option<SmallVec<[u8; 8]>> {
        if self.reply.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.reply))
        }
    }

    /// Whether anything (screen or status row) awaits a write burst.
    #[must_use]
    pub fn needs_write(&self) -> bool {
        self.screen.dirty_pending() || self.status.dirty()
    }

    /// Consume the pending extent: application spans first, then the
    /// status row as a span at [`STATUS_ROW`].
    pub fn take_dirty(&mut self) -> SmallVec<[DirtySpan; 8]> {
        let mut spans = self.screen.take_dirty();
        if self.status.dirty() {
            spans.push(DirtySpan {
                row: STATUS_ROW,
                first_col: 0,
                last_col: (SCREEN_COLS - 1) as u8,
            });
            self.status.mark_clean();
        }
        spans
    }

    /// Cell lookup across both the application screen and the status row,
    /// the way write-burst encoding addresses them.
    #[must_use]
    pub fn cell_at(&self, row: u8, col: u8) -> DisplayCell {
        if row == STATUS_ROW {
            self.status.cell(usize::from(col))
        } else {
            self.screen.cell(usize::from(row), usize::from(col))
        }
    }

    /// Push indicator bits reported by the terminal into the status row.
    pub fn report_indicators(
        &mut self,
        indicators: StatusIndicators,
        charset: &SessionCharset,
    ) {
        self.status.update(indicators, charset);
    }
}
