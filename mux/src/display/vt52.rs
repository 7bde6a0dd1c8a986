// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! VT52 escape-sequence parser.
//!
//! A pure function of `(state, byte)`: each byte either mutates the screen
//! directly or moves the parser through the tiny escape state machine. The
//! only sequence with parameters is `ESC Y row col`, whose two parameter
//! bytes are raw (0x20-biased), which is why this is hand-rolled rather
//! than layered on a CSI-oriented tokenizer.
//!
//! Beyond the classic VT52 set the parser honors the save/restore cursor
//! extension (`ESC j` / `ESC k`) that the Atari lineage of VT52s added and
//! most curses databases expect from a `vt52`-flavored entry.

use crate::charset::SessionCharset;

use super::screen::ScreenBuffer;

const ESC: u8 = 0x1B;

/// Effects the parser cannot apply to the screen itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vt52Effect {
    /// `ESC Z`: the application asked who we are; reply `ESC / K` on the
    /// keyboard path.
    Identify,
    /// `ESC =` / `ESC >`: alternate keypad entered / left.
    KeypadAlternate(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Vt52State {
    #[default]
    Ground,
    GotEsc,
    GotEscYRow,
    GotEscYCol {
        row: u8,
    },
}

#[derive(Debug, Default)]
pub struct Vt52Parser {
    state: Vt52State,
}

impl Vt52Parser {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Process one byte against the screen.
    pub fn feed(
        &mut self,
        byte: u8,
        screen: &mut ScreenBuffer,
        charset: &SessionCharset,
    ) -> Option<Vt52Effect> {
        match self.state {
            Vt52State::Ground => self.ground(byte, screen, charset),
            Vt52State::GotEsc => self.escape(byte, screen),
            Vt52State::GotEscYRow => {
                if byte == ESC {
                    // An aborted address sequence; start over.
                    self.state = Vt52State::GotEsc;
                } else {
                    self.state = Vt52State::GotEscYCol {
                        row: byte.saturating_sub(0x20),
                    };
                }
                None
            }
            Vt52State::GotEscYCol { row } => {
                let col = byte.saturating_sub(0x20);
                screen.set_cursor(usize::from(row), usize::from(col));
                self.state = Vt52State::Ground;
                None
            }
        }
    }

    fn ground(
        &mut self,
        byte: u8,
        screen: &mut ScreenBuffer,
        charset: &SessionCharset,
    ) -> Option<Vt52Effect> {
        match byte {
            ESC => self.state = Vt52State::GotEsc,
            0x0A => screen.line_feed(),
            0x0D => screen.carriage_return(),
            0x08 => screen.backspace(),
            0x09 => screen.tab(),
            0x00..=0x1F | 0x7F => {
                // Remaining controls (BEL and friends) have no display
                // meaning here.
            }
            printable => screen.print_char(charset.to_ebcdic(printable)),
        }
        None
    }

    fn escape(&mut self, byte: u8, screen: &mut ScreenBuffer) -> Option<Vt52Effect> {
        self.state = Vt52State::Ground;
        match byte {
            b'A' => screen.cursor_up(),
            b'B' => screen.cursor_down(),
            b'C' => screen.cursor_right(),
            b'D' => screen.cursor_left(),
            b'H' => screen.cursor_home(),
            b'I' => screen.reverse_line_feed(),
            b'J' => screen.erase_to_end_of_screen(),
            b'K' => screen.erase_to_end_of_line(),
            b'E' => screen.clear_all(),
            b'Y' => self.state = Vt52State::GotEscYRow,
            b'Z' => return Some(Vt52Effect::Identify),
            b'=' => return Some(Vt52Effect::KeypadAlternate(true)),
            b'>' => return Some(Vt52Effect::KeypadAlternate(false)),
            b'p' => screen.set_reverse(true),
            b'q' => screen.set_reverse(false),
            b'j' => screen.save_cursor(),
            b'k' => screen.restore_cursor(),
            ESC => self.state = Vt52State::GotEsc,
            other => {
                tracing::trace!(target: "twinax_mux::ptyio", byte = other, "unrecognized VT52 escape");
            }
        }
        None
    }
}
