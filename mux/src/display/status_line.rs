// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! The separate status row.
//!
//! Indicator bits reported by the terminal are formatted at fixed columns
//! on the row below the application screen. VT52 output can never touch
//! this row; only [`StatusLine::update`] rewrites it, and only when the
//! indicator set actually changed.

use crate::{
    charset::SessionCharset,
    station::frame::StatusIndicators,
};

use super::{
    cell::{CellAttrs, DisplayCell},
    screen::SCREEN_COLS,
};

const SYSTEM_AVAILABLE_COL: usize = 0;
const MESSAGE_WAITING_COL: usize = 5;
const INPUT_INHIBITED_COL: usize = 10;

#[derive(Debug)]
pub struct StatusLine {
    cells: [DisplayCell; SCREEN_COLS],
    indicators: StatusIndicators,
    dirty: bool,
}

impl Default for StatusLine {
    fn default() -> Self {
        Self {
            cells: [DisplayCell::BLANK; SCREEN_COLS],
            indicators: StatusIndicators::empty(),
            dirty: false,
        }
    }
}

impl StatusLine {
    #[must_use]
    pub fn indicators(&self) -> StatusIndicators { self.indicators }

    #[must_use]
    pub fn cell(&self, col: usize) -> DisplayCell { self.cells[col] }

    /// Whether the row needs to go out on the next write burst.
    #[must_use]
    pub fn dirty(&self) -> bool { self.dirty }

    pub fn mark_clean(&mut self) { self.dirty = false; }

    /// Reformat the row for a new indicator set. No-op when unchanged.
    pub fn update(&mut self, indicators: StatusIndicators, charset: &SessionCharset) {
        if indicators == self.indicators {
            return;
        }
        self.indicators = indicators;
        self.cells = [DisplayCell::BLANK; SCREEN_COLS];

        if indicators.contains(StatusIndicators::SYSTEM_AVAILABLE) {
            self.put(SYSTEM_AVAILABLE_COL, b"SA", charset);
        }
        if indicators.contains(StatusIndicators::MESSAGE_WAITING) {
            self.put(MESSAGE_WAITING_COL, b"MW", charset);
        }
        if indicators.contains(StatusIndicators::INPUT_INHIBITED) {
            self.put(INPUT_INHIBITED_COL, b"X II", charset);
        }
        self.dirty = true;
    }

    fn put(&mut self, col: usize, label: &[u8], charset: &SessionCharset) {
        for (i, &ascii) in label.iter().enumerate() {
            self.cells[col + i] =
                DisplayCell::new(charset.to_ebcdic(ascii), CellAttrs::REVERSE);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charset::CP037;

    #[test]
    fn indicator_change_marks_the_row_dirty() {
        let charset = SessionCharset::new(&CP037);
        let mut status = StatusLine::default();
        status.update(StatusIndicators::SYSTEM_AVAILABLE, &charset);
        assert!(status.dirty());
        // "SA" in EBCDIC at the fixed column.
        assert_eq!(status.cell(SYSTEM_AVAILABLE_COL).ch, 0xE2);
        assert_eq!(status.cell(SYSTEM_AVAILABLE_COL + 1).ch, 0xC1);

        status.mark_clean();
        status.update(StatusIndicators::SYSTEM_AVAILABLE, &charset);
        assert!(!status.dirty(), "unchanged indicators must not re-dirty");
    }

    #[test]
    fn dropped_indicator_clears_its_label() {
        let charset = SessionCharset::new(&CP037);
        let mut status = StatusLine::default();
        status.update(
            StatusIndicators::SYSTEM_AVAILABLE | StatusIndicators::INPUT_INHIBITED,
            &charset,
        );
        status.update(StatusIndicators::SYSTEM_AVAILABLE, &charset);
        assert_eq!(status.cell(INPUT_INHIBITED_COL), DisplayCell::BLANK);
    }
}
