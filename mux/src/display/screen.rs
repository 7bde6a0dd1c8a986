// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! The 24×80 regen buffer and its dirty-extent bookkeeping.
//!
//! Nothing here touches the wire. VT52 interpretation mutates cells and
//! records dirty spans; the station engine consumes the spans atomically
//! when it is ready to issue a write burst. A span is a height-one
//! rectangle; two spans on the same row whose column ranges touch or
//! overlap are merged so one burst covers both.

use smallvec::SmallVec;

use super::cell::{CellAttrs, DisplayCell};

pub const SCREEN_ROWS: usize = 24;
pub const SCREEN_COLS: usize = 80;

/// Row index the status line occupies in write bursts (below the 24
/// application rows).
pub const STATUS_ROW: u8 = SCREEN_ROWS as u8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CursorPos {
    pub row: usize,
    pub col: usize,
}

/// A dirty height-one rectangle; columns are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirtySpan {
    pub row: u8,
    pub first_col: u8,
    pub last_col: u8,
}

impl DirtySpan {
    fn touches(&self, other: &DirtySpan) -> bool {
        self.row == other.row
            && u16::from(self.first_col) <= u16::from(other.last_col) + 1
            && u16::from(other.first_col) <= u16::from(self.last_col) + 1
    }

    fn absorb(&mut self, other: &DirtySpan) {
        self.first_col = self.first_col.min(other.first_col);
        self.last_col = self.last_col.max(other.last_col);
    }
}

/// Pending dirty spans, write-combined as they are added.
#[derive(Debug, Default)]
pub struct DirtySpans {
    spans: SmallVec<[DirtySpan; 8]>,
}

impl DirtySpans {
    pub fn mark_cell(&mut self, row: u8, col: u8) { self.mark_span(row, col, col); }

    pub fn mark_span(&mut self, row: u8, first_col: u8, last_col: u8) {
        let mut incoming = DirtySpan {
            row,
            first_col,
            last_col,
        };
        // Merge with every span it touches; absorbing one span can bridge
        // the gap to another, so sweep until stable.
        loop {
            let Some(idx) = self.spans.iter().position(|s| s.touches(&incoming)) else {
                break;
            };
            let existing = self.spans.swap_remove(idx);
            incoming.absorb(&existing);
        }
        self.spans.push(incoming);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.spans.is_empty() }

    /// Consume all pending spans, ordered by (row, column).
    pub fn take(&mut self) -> SmallVec<[DirtySpan; 8]> {
        let mut spans = std::mem::take(&mut self.spans);
        spans.sort_unstable_by_key(|s| (s.row, s.first_col));
        spans
    }
}

/// The application screen: cells, cursor, and the current attribute
/// register new cells are written with.
#[derive(Debug)]
pub struct ScreenBuffer {
    cells: [[DisplayCell; SCREEN_COLS]; SCREEN_ROWS],
    cursor: CursorPos,
    saved_cursor: CursorPos,
    current_attrs: CellAttrs,
    dirty: DirtySpans,
}

impl Default for ScreenBuffer {
    fn default() -> Self { Self::new() }
}

impl ScreenBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            cells: [[DisplayCell::BLANK; SCREEN_COLS]; SCREEN_ROWS],
            cursor: CursorPos::default(),
            saved_cursor: CursorPos::default(),
            current_attrs: CellAttrs::empty(),
            dirty: DirtySpans::default(),
        }
    }

    #[must_use]
    pub fn cursor(&self) -> CursorPos { self.cursor }

    #[must_use]
    pub fn cell(&self, row: usize, col: usize) -> DisplayCell { self.cells[row][col] }

    #[must_use]
    pub fn current_attrs(&self) -> CellAttrs { self.current_attrs }

    pub fn set_reverse(&mut self, on: bool) {
        self.current_attrs.set(CellAttrs::REVERSE, on);
    }

    #[must_use]
    pub fn dirty_pending(&self) -> bool { !self.dirty.is_empty() }

    /// Consume the dirty extent atomically.
    pub fn take_dirty(&mut self) -> SmallVec<[DirtySpan; 8]> { self.dirty.take() }

    /// Write one character at the cursor and advance.
    ///
    /// At column 79 the cursor stays put and further printables overwrite
    /// the last cell; wrapping is the application's business, not ours.
    pub fn print_char(&mut self, ebcdic: u8) {
        let CursorPos { row, col } = self.cursor;
        self.cells[row][col] = DisplayCell::new(ebcdic, self.current_attrs);
        self.dirty.mark_cell(row as u8, col as u8);
        if col + 1 < SCREEN_COLS {
            self.cursor.col = col + 1;
        }
    }

    /// LF: next row, scrolling the screen up when already on the last one.
    pub fn line_feed(&mut self) {
        if self.cursor.row + 1 < SCREEN_ROWS {
            self.cursor.row += 1;
        } else {
            self.scroll_up();
        }
    }

    pub fn carriage_return(&mut self) { self.cursor.col = 0; }

    pub fn backspace(&mut self) { self.cursor.col = self.cursor.col.saturating_sub(1); }

    /// HT: advance to the next 8-column stop, clamped to the last column.
    pub fn tab(&mut self) {
        self.cursor.col = ((self.cursor.col / 8 + 1) * 8).min(SCREEN_COLS - 1);
    }

    pub fn cursor_up(&mut self) { self.cursor.row = self.cursor.row.saturating_sub(1); }

    pub fn cursor_down(&mut self) {
        self.cursor.row = (self.cursor.row + 1).min(SCREEN_ROWS - 1);
    }

    pub fn cursor_left(&mut self) { self.cursor.col = self.cursor.col.saturating_sub(1); }

    pub fn cursor_right(&mut self) {
        self.cursor.col = (self.cursor.col + 1).min(SCREEN_COLS - 1);
    }

    pub fn cursor_home(&mut self) { self.cursor = CursorPos::default(); }

    /// Direct address, clamped into the screen.
    pub fn set_cursor(&mut self, row: usize, col: usize) {
        self.cursor = CursorPos {
            row: row.min(SCREEN_ROWS - 1),
            col: col.min(SCREEN_COLS - 1),
        };
    }

    pub fn save_cursor(&mut self) { self.saved_cursor = self.cursor; }

    pub fn restore_cursor(&mut self) { self.cursor = self.saved_cursor; }

    /// Reverse LF: previous row, scrolling the screen down at the top.
    pub fn reverse_line_feed(&mut self) {
        if self.cursor.row > 0 {
            self.cursor.row -= 1;
        } else {
            self.scroll_down();
        }
    }

    /// Erase from the cursor to the end of the line with the current
    /// attribute.
    pub fn erase_to_end_of_line(&mut self) {
        let CursorPos { row, col } = self.cursor;
        let fill = DisplayCell::blank_with(self.current_attrs);
        for cell in &mut self.cells[row][col..] {
            *cell = fill;
        }
        self.dirty
            .mark_span(row as u8, col as u8, (SCREEN_COLS - 1) as u8);
    }

    /// Erase from the cursor to the end of the screen.
    pub fn erase_to_end_of_screen(&mut self) {
        self.erase_to_end_of_line();
        let fill = DisplayCell::blank_with(self.current_attrs);
        for row in self.cursor.row + 1..SCREEN_ROWS {
            self.cells[row] = [fill; SCREEN_COLS];
            self.dirty.mark_span(row as u8, 0, (SCREEN_COLS - 1) as u8);
        }
    }

    /// ESC E: every cell back to (space, default attribute), cursor home.
    pub fn clear_all(&mut self) {
        self.cells = [[DisplayCell::BLANK; SCREEN_COLS]; SCREEN_ROWS];
        self.cursor = CursorPos::default();
        self.mark_all_dirty();
    }

    fn scroll_up(&mut self) {
        self.cells.rotate_left(1);
        self.cells[SCREEN_ROWS - 1] =
            [DisplayCell::blank_with(self.current_attrs); SCREEN_COLS];
        self.mark_all_dirty();
    }

    fn scroll_down(&mut self) {
        self.cells.rotate_right(1);
        self.cells[0] = [DisplayCell::blank_with(self.current_attrs); SCREEN_COLS];
        self.mark_all_dirty();
    }

    fn mark_all_dirty(&mut self) {
        for row in 0..SCREEN_ROWS {
            self.dirty.mark_span(row as u8, 0, (SCREEN_COLS - 1) as u8);
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::charset::EBCDIC_SPACE;

    #[test]
    fn spans_on_one_row_merge_when_touching() {
        let mut dirty = DirtySpans::default();
        dirty.mark_span(3, 0, 4);
        dirty.mark_span(3, 5, 9);
        let spans = dirty.take();
        assert_eq!(spans.len(), 1);
        assert_eq!(
            spans[0],
            DirtySpan {
                row: 3,
                first_col: 0,
                last_col: 9
            }
        );
    }

    #[test]
    fn disjoint_spans_stay_separate() {
        let mut dirty = DirtySpans::default();
        dirty.mark_span(3, 0, 4);
        dirty.mark_span(3, 10, 12);
        dirty.mark_span(4, 5, 9);
        assert_eq!(dirty.take().len(), 3);
    }

    #[test]
    fn a_late_span_can_bridge_two_earlier_ones() {
        let mut dirty = DirtySpans::default();
        dirty.mark_span(7, 0, 2);
        dirty.mark_span(7, 8, 9);
        dirty.mark_span(7, 3, 7);
        let spans = dirty.take();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].first_col, 0);
        assert_eq!(spans[0].last_col, 9);
    }

    #[test]
    fn printing_at_the_last_column_does_not_wrap() {
        let mut screen = ScreenBuffer::new();
        screen.set_cursor(5, SCREEN_COLS - 1);
        screen.print_char(0xC1);
        assert_eq!(screen.cursor(), CursorPos { row: 5, col: 79 });
        screen.print_char(0xC2);
        assert_eq!(screen.cursor(), CursorPos { row: 5, col: 79 });
        assert_eq!(screen.cell(5, 79).ch, 0xC2);
    }

    #[test]
    fn line_feed_on_the_last_row_scrolls_and_discards_the_top() {
        let mut screen = ScreenBuffer::new();
        screen.print_char(0xC1); // 'A' in row 0
        screen.set_cursor(SCREEN_ROWS - 1, 0);
        screen.print_char(0xC2);
        screen.line_feed();
        assert_eq!(screen.cursor().row, SCREEN_ROWS - 1);
        // Row 0's content is gone; the old last row moved up.
        assert_eq!(screen.cell(0, 0).ch, EBCDIC_SPACE);
        assert_eq!(screen.cell(SCREEN_ROWS - 2, 0).ch, 0xC2);
    }

    #[test]
    fn reverse_line_feed_at_the_top_scrolls_down() {
        let mut screen = ScreenBuffer::new();
        screen.print_char(0xC1);
        screen.cursor_home();
        screen.reverse_line_feed();
        assert_eq!(screen.cursor().row, 0);
        assert_eq!(screen.cell(1, 0).ch, 0xC1);
        assert_eq!(screen.cell(0, 0).ch, EBCDIC_SPACE);
    }

    #[test]
    fn erase_to_end_of_line_uses_the_current_attribute() {
        let mut screen = ScreenBuffer::new();
        screen.set_reverse(true);
        screen.set_cursor(2, 78);
        screen.erase_to_end_of_line();
        assert_eq!(screen.cell(2, 78).attrs, CellAttrs::REVERSE);
        assert_eq!(screen.cell(2, 79).attrs, CellAttrs::REVERSE);
        assert_eq!(screen.cell(2, 77).attrs, CellAttrs::empty());
    }

    #[test]
    fn clear_all_resets_cells_and_cursor() {
        let mut screen = ScreenBuffer::new();
        screen.set_reverse(true);
        screen.set_cursor(10, 40);
        screen.print_char(0xC1);
        screen.clear_all();
        assert_eq!(screen.cursor(), CursorPos::default());
        for row in 0..SCREEN_ROWS {
            for col in 0..SCREEN_COLS {
                assert_eq!(screen.cell(row, col), DisplayCell::BLANK);
            }
        }
        // The whole screen is one dirty extent per row.
        assert_eq!(screen.take_dirty().len(), SCREEN_ROWS);
    }

    #[test]
    fn cursor_stays_inside_the_screen() {
        let mut screen = ScreenBuffer::new();
        for _ in 0..5 {
            screen.cursor_up();
            screen.cursor_left();
        }
        assert_eq!(screen.cursor(), CursorPos { row: 0, col: 0 });
        screen.set_cursor(200, 200);
        assert_eq!(screen.cursor(), CursorPos { row: 23, col: 79 });
        for _ in 0..5 {
            screen.cursor_down();
            screen.cursor_right();
        }
        assert_eq!(screen.cursor(), CursorPos { row: 23, col: 79 });
    }

    #[test]
    fn save_and_restore_cursor() {
        let mut screen = ScreenBuffer::new();
        screen.set_cursor(7, 12);
        screen.save_cursor();
        screen.set_cursor(20, 1);
        screen.restore_cursor();
        assert_eq!(screen.cursor(), CursorPos { row: 7, col: 12 });
    }
}
