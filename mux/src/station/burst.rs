// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Write-burst encoding: dirty spans → the word sequence for one screen
//! update.
//!
//! A burst is `StartWrite`, a stream of positional data words, and
//! `EndWrite`. The terminal's write position auto-advances after every
//! character (wrapping from column 79 to the next row), so `SetAddress` is
//! only emitted when a span does not continue exactly where the previous
//! word left off. The terminal resets its running attribute to the default
//! at `StartWrite`; an attribute word is emitted whenever the next cell's
//! attributes differ from the running value.

use smallvec::SmallVec;

use crate::display::{DisplayController, DirtySpan, SCREEN_COLS, CellAttrs};

use super::frame::{self, Command};

/// Encode one atomic display-update burst for the given station.
///
/// `spans` must be the output of
/// [`DisplayController::take_dirty`]: ordered by row and column.
#[must_use]
pub fn encode_write_burst(
    addr: u8,
    spans: &[DirtySpan],
    display: &DisplayController,
) -> SmallVec<[u16; 8]> {
    let mut words: SmallVec<[u16; 8]> = SmallVec::new();
    words.push(frame::command_word(addr, Command::StartWrite));

    let mut write_pos: Option<(u8, u8)> = None;
    let mut running_attrs = CellAttrs::empty();

    for span in spans {
        if write_pos != Some((span.row, span.first_col)) {
            words.push(frame::command_word(addr, Command::SetAddress));
            words.push(frame::data_word(u16::from(span.row)));
            words.push(frame::data_word(u16::from(span.first_col)));
        }
        for col in span.first_col..=span.last_col {
            let cell = display.cell_at(span.row, col);
            if cell.attrs != running_attrs {
                words.push(frame::attr_word(cell.attrs.bits()));
                running_attrs = cell.attrs;
            }
            words.push(frame::char_word(cell.ch));
        }
        // Where the terminal's auto-advance leaves the write position.
        write_pos = if usize::from(span.last_col) + 1 < SCREEN_COLS {
            Some((span.row, span.last_col + 1))
        } else {
            Some((span.row + 1, 0))
        };
    }

    words.push(frame::command_word(addr, Command::EndWrite));
    words
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        charset::{CP037, SessionCharset},
        display::{SCREEN_ROWS, DisplayController},
        station::frame::{DATA_ATTR_MARK, command_word, data_word},
    };

    fn painted(bytes: &[u8]) -> DisplayController {
        let charset = SessionCharset::new(&CP037);
        let mut display = DisplayController::new();
        display.apply_bytes(bytes, &charset);
        display
    }

    #[test]
    fn single_cell_burst_is_minimal() {
        let mut display = painted(b"\x1BY\x25\x30E");
        let spans = display.take_dirty();
        let words = encode_write_burst(2, &spans, &display);

        assert_eq!(
            words.as_slice(),
            &[
                command_word(2, Command::StartWrite),
                command_word(2, Command::SetAddress),
                data_word(5),
                data_word(16),
                frame::char_word(0xC5), // 'E'
                command_word(2, Command::EndWrite),
            ]
        );
    }

    #[test]
    fn full_screen_clear_positions_once() {
        let mut display = painted(b"junk\x1BE");
        let spans = display.take_dirty();
        let words = encode_write_burst(0, &spans, &display);

        // StartWrite + one SetAddress triple + 24*80 blanks + EndWrite.
        assert_eq!(words.len(), 1 + 3 + SCREEN_ROWS * SCREEN_COLS + 1);
        let set_address = command_word(0, Command::SetAddress);
        assert_eq!(
            words.iter().filter(|&&w| w == set_address).count(),
            1,
            "sequential rows must ride the auto-advance"
        );
    }

    #[test]
    fn attribute_change_inserts_one_attr_word() {
        let mut display = painted(b"a\x1Bpb\x1Bqc");
        let spans = display.take_dirty();
        let words = encode_write_burst(1, &spans, &display);

        let attr_words = words
            .iter()
            .filter(|&&w| w & 0x10 == 0) // data words only
            .filter(|&&w| (w >> 5) & DATA_ATTR_MARK != 0)
            .count();
        // One to turn reverse on, one to turn it back off.
        assert_eq!(attr_words, 2);
    }

    #[test]
    fn disjoint_spans_get_their_own_addresses() {
        let mut display = painted(b"\x1BY\x20\x20A\x1BY\x2A\x40B");
        let spans = display.take_dirty();
        let words = encode_write_burst(3, &spans, &display);
        let set_address = command_word(3, Command::SetAddress);
        assert_eq!(words.iter().filter(|&&w| w == set_address).count(), 2);
    }
}
