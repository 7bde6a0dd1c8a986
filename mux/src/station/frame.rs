// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Twinax frame composition and classification.
//!
//! Every unit of traffic between the host and the line driver firmware is one
//! 16-bit word. The serial codec transports bits `[14:4]` of each word (see
//! [`crate::serial::codec`]); everything the host and the firmware exchange
//! therefore lives inside that window:
//!
//! ```text
//! outbound command:  [14:12] station address  [11:5] opcode          [4] = 1
//! outbound data:     [13:5]  9-bit payload                           [4] = 0
//! inbound response:  [14:13] class  [12:5] 8-bit payload             [4] parity
//! ```
//!
//! Data words carry no station address. They are only legal between a
//! `StartWrite` and an `EndWrite` addressed to a single station, and the
//! scheduler never interleaves another station's words into that burst, so
//! the firmware always knows the destination. Inbound responses likewise
//! carry no address: exactly one poll is outstanding per station and the
//! link is FIFO, so the scheduler attributes each response to the station
//! that issued the oldest unanswered request.

use bitflags::bitflags;

/// Station addresses run 0 through 6; address 7 is reserved by the bus.
pub const MAX_STATION_ADDR: u8 = 6;

/// Number of station slots the scheduler manages.
pub const STATION_COUNT: usize = 7;

const ADDR_SHIFT: u32 = 12;
const OPCODE_SHIFT: u32 = 5;
const DATA_SHIFT: u32 = 5;
const RESPONSE_CLASS_SHIFT: u32 = 13;
const RESPONSE_PAYLOAD_SHIFT: u32 = 5;

/// Discriminator bit: set on command words, clear on data words.
const COMMAND_FLAG: u16 = 1 << 4;

/// Parity bit position in inbound response words.
const RESPONSE_PARITY_BIT: u16 = 1 << 4;

/// Marker bit inside a 9-bit data payload: the low 8 bits are a packed
/// attribute byte rather than an EBCDIC character.
pub const DATA_ATTR_MARK: u16 = 1 << 8;

/// Command opcodes the host issues to a station (7 bits).
///
/// The poll/ack pair is the steady-state heartbeat; the rest appear during
/// initialization, screen updates, and drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[repr(u8)]
pub enum Command {
    Poll = 0x01,
    Ack = 0x02,
    Reset = 0x04,
    QueryKeyboardId = 0x08,
    EnableKeyboard = 0x0A,
    ClearScreen = 0x10,
    StartWrite = 0x20,
    EndWrite = 0x21,
    SetAddress = 0x22,
    SetIndicators = 0x30,
}

/// Compose an addressed command word.
#[must_use]
pub fn command_word(addr: u8, cmd: Command) -> u16 {
    debug_assert!(addr <= MAX_STATION_ADDR);
    (u16::from(addr) << ADDR_SHIFT) | (u16::from(cmd as u8) << OPCODE_SHIFT) | COMMAND_FLAG
}

/// Compose a positional data word from a 9-bit payload.
#[must_use]
pub fn data_word(payload: u16) -> u16 {
    debug_assert!(payload < 0x200);
    payload << DATA_SHIFT
}

/// Data word carrying one EBCDIC character.
#[must_use]
pub fn char_word(ebcdic: u8) -> u16 { data_word(u16::from(ebcdic)) }

/// Data word carrying a packed attribute byte (bit 8 of the payload set).
#[must_use]
pub fn attr_word(attrs: u8) -> u16 { data_word(DATA_ATTR_MARK | u16::from(attrs)) }

/// Even parity across a 16-bit word, computed the way the firmware computes
/// it: the XOR of the even-parities of the low and the high byte.
#[must_use]
pub fn even_parity(word: u16) -> bool { word.count_ones() % 2 == 0 }

bitflags! {
    /// Indicator bits a terminal reports in a status response.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StatusIndicators: u8 {
        const SYSTEM_AVAILABLE = 0x01;
        const MESSAGE_WAITING  = 0x02;
        const INPUT_INHIBITED  = 0x04;
        /// Positive acknowledgement of the last addressed command.
        const ACK              = 0x08;
    }
}

/// Classified inbound response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    /// Station is idle; nothing to report.
    Null,
    /// A keystroke; the payload is the raw scancode.
    Scancode(u8),
    /// Indicator bits changed or a command was acknowledged.
    Status(StatusIndicators),
    /// The station rejected or could not accept the last command.
    Nak,
}

/// Extract the response class and payload from an inbound word.
///
/// The caller is expected to have verified parity first via
/// [`response_parity_ok`]; classification itself never fails.
#[must_use]
pub fn classify_response(word: u16) -> Response {
    let payload = ((word >> RESPONSE_PAYLOAD_SHIFT) & 0xFF) as u8;
    match (word >> RESPONSE_CLASS_SHIFT) & 0b11 {
        0b00 => Response::Null,
        0b01 => Response::Scancode(payload),
        0b10 => Response::Status(StatusIndicators::from_bits_truncate(payload)),
        _ => Response::Nak,
    }
}

/// Whether an inbound response word passes the even-parity check.
///
/// The firmware sets the response parity bit so that valid words have even
/// parity overall; a word that fails here was corrupted between the line
/// driver and the host.
#[must_use]
pub fn response_parity_ok(word: u16) -> bool { even_parity(word) }

/// Build a response word the way the firmware does, parity bit included.
///
/// Only the loopback tests construct inbound traffic on the host side.
#[cfg(test)]
#[must_use]
pub fn make_response(class: u8, payload: u8) -> u16 {
    debug_assert!(class < 4);
    let word = (u16::from(class) << RESPONSE_CLASS_SHIFT)
        | (u16::from(payload) << RESPONSE_PAYLOAD_SHIFT);
    if even_parity(word) { word } else { word | RESPONSE_PARITY_BIT }
}

#[cfg(test)]
pub const RESPONSE_CLASS_NULL: u8 = 0b00;
#[cfg(test)]
pub const RESPONSE_CLASS_SCANCODE: u8 = 0b01;
#[cfg(test)]
pub const RESPONSE_CLASS_STATUS: u8 = 0b10;
#[cfg(test)]
pub const RESPONSE_CLASS_NAK: u8 = 0b11;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_words_carry_address_opcode_and_discriminator() {
        let word = command_word(5, Command::Poll);
        assert_eq!(word >> ADDR_SHIFT, 5);
        assert_eq!((word >> OPCODE_SHIFT) & 0x7F, 0x01);
        assert_ne!(word & COMMAND_FLAG, 0);
        // Everything must stay inside the transported window.
        assert_eq!(word & !0x7FF0, 0);
    }

    #[test]
    fn data_words_clear_the_discriminator() {
        assert_eq!(char_word(0xC5) & COMMAND_FLAG, 0);
        assert_eq!(char_word(0xC5) >> DATA_SHIFT, 0xC5);
        assert_eq!(attr_word(0x22) >> DATA_SHIFT, DATA_ATTR_MARK | 0x22);
    }

    #[test]
    fn parity_matches_the_byte_xor_formulation() {
        fn byte_even_parity(b: u8) -> bool { b.count_ones() % 2 == 0 }
        for word in [0x0000u16, 0x7FF0, 0x1234, 0xA5A5, 0x0410, char_word(0x81)] {
            let lo = (word & 0xFF) as u8;
            let hi = (word >> 8) as u8;
            // XOR of two even-parity bits flips exactly when the combined
            // word has odd parity.
            assert_eq!(
                byte_even_parity(lo) ^ byte_even_parity(hi),
                !even_parity(word),
                "word {word:#06x}"
            );
        }
    }

    #[test]
    fn responses_round_trip_through_classification() {
        assert_eq!(
            classify_response(make_response(RESPONSE_CLASS_NULL, 0)),
            Response::Null
        );
        assert_eq!(
            classify_response(make_response(RESPONSE_CLASS_SCANCODE, 0x23)),
            Response::Scancode(0x23)
        );
        assert_eq!(
            classify_response(make_response(RESPONSE_CLASS_STATUS, 0x05)),
            Response::Status(
                StatusIndicators::SYSTEM_AVAILABLE | StatusIndicators::INPUT_INHIBITED
            )
        );
        assert_eq!(
            classify_response(make_response(RESPONSE_CLASS_NAK, 0)),
            Response::Nak
        );
    }

    #[test]
    fn fabricated_responses_always_have_even_parity() {
        for class in 0..4u8 {
            for payload in [0u8, 1, 0x23, 0x54, 0x7F, 0xFF] {
                assert!(response_parity_ok(make_response(class, payload)));
            }
        }
    }
}
