// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Serial record codec for the link to the line driver firmware.
//!
//! Each 16-bit word crosses the 57600 8N1 link as two printable bytes, and a
//! batch of words forms one newline-terminated record:
//!
//! ```text
//! B1 = 0x40 | ((W >> 9) & 0x3F)
//! B2 = 0x40 | ((W >> 4) & 0x1F)
//! ```
//!
//! Eleven significant bits (`[14:4]`) survive the trip; bit 15 and bits
//! `[3:0]` are never transported and must be zero in host-originated words.
//! Inbound records use the same pairing, so the decoder is the exact inverse
//! of the encoder and `decode(encode(w)) == w` holds on the masked domain.
//!
//! Two literal lines are special: `[DEBUG]`-prefixed lines are firmware
//! diagnostics, and a bare `[EOTX]` line reports that a previously written
//! host record has finished going out on the twinax wire.

use std::collections::VecDeque;

use smallvec::SmallVec;

const DEBUG_TOKEN: &[u8] = b"[DEBUG]";
const EOTX_TOKEN: &[u8] = b"[EOTX]";

/// Longest inbound record the codec will buffer while waiting for a newline.
/// Anything longer means the link is out of sync; the partial line is
/// reported as malformed and discarded.
const MAX_RECORD_LEN: usize = 8192;

/// Typed event reassembled from the inbound byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SerialEvent {
    /// One decoded 16-bit word.
    Word(u16),
    /// The firmware finished transmitting a host-originated record.
    EndOfTransmission,
    /// A `[DEBUG]` diagnostic line, with the token stripped.
    DebugLine(String),
    /// A non-token line whose payload could not form whole byte pairs.
    Malformed { len: usize },
}

/// Encode one word into its two-byte wire form.
#[must_use]
pub fn encode_word(word: u16) -> [u8; 2] {
    [
        0x40 | ((word >> 9) & 0x3F) as u8,
        0x40 | ((word >> 4) & 0x1F) as u8,
    ]
}

/// Decode one byte pair back into a word. Inverse of [`encode_word`].
#[must_use]
pub fn decode_pair(b1: u8, b2: u8) -> u16 {
    (u16::from(b1 & 0x3F) << 9) | (u16::from(b2 & 0x1F) << 4)
}

/// Append the wire form of a word batch to `out`: concatenated byte pairs
/// closed by a single newline. The codec never emits a partial pair.
pub fn encode_record(words: &[u16], out: &mut Vec<u8>) {
    out.reserve(words.len() * 2 + 1);
    for &word in words {
        debug_assert_eq!(word & !0x7FF0, 0, "word has bits outside [14:4]");
        out.extend_from_slice(&encode_word(word));
    }
    out.push(b'\n');
}

/// Push-style inbound reassembler.
///
/// Feed it raw bytes as they arrive off the serial fd; pull typed
/// [`SerialEvent`]s in arrival order. Word order within a record and record
/// order on the link are both preserved.
#[derive(Debug, Default)]
pub struct SerialCodec {
    line: Vec<u8>,
    events: VecDeque<SerialEvent>,
}

impl SerialCodec {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Absorb raw bytes, splitting on newlines and queueing decoded events.
    pub fn feed(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            if byte == b'\n' {
                let line = std::mem::take(&mut self.line);
                self.finish_line(&line);
            } else {
                self.line.push(byte);
                if self.line.len() > MAX_RECORD_LEN {
                    let len = self.line.len();
                    self.line.clear();
                    self.events.push_back(SerialEvent::Malformed { len });
                }
            }
        }
    }

    /// Pop the next queued event, if any.
    pub fn next_event(&mut self) -> Option<SerialEvent> { self.events.pop_front() }

    fn finish_line(&mut self, line: &[u8]) {
        // CR before the LF is tolerated; some USB serial stacks insert it.
        let line = line.strip_suffix(b"\r").unwrap_or(line);

        if line.is_empty() {
            return;
        }
        if line == EOTX_TOKEN {
            self.events.push_back(SerialEvent::EndOfTransmission);
            return;
        }
        if line.starts_with(DEBUG_TOKEN) {
            let text = String::from_utf8_lossy(&line[DEBUG_TOKEN.len()..])
                .trim()
                .to_string();
            self.events.push_back(SerialEvent::DebugLine(text));
            return;
        }
        if line.len() % 2 != 0 {
            self.events.push_back(SerialEvent::Malformed { len: line.len() });
            return;
        }

        let words: SmallVec<[u16; 8]> = line
            .chunks_exact(2)
            .map(|pair| decode_pair(pair[0], pair[1]))
            .collect();
        self.events.extend(words.into_iter().map(SerialEvent::Word));
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn encode_decode_round_trips_on_the_masked_domain() {
        // Every word with bit 15 and bits [3:0] clear survives the trip.
        for w in (0u16..=0x7FF).map(|v| v << 4) {
            let [b1, b2] = encode_word(w);
            assert_eq!(decode_pair(b1, b2), w, "word {w:#06x}");
            // Both bytes stay printable for the firmware's line discipline.
            assert!(b1 >= 0x40 && b2 >= 0x40);
        }
    }

    #[test]
    fn records_are_byte_pairs_plus_one_newline() {
        let mut out = Vec::new();
        encode_record(&[0x1230, 0x0450], &mut out);
        assert_eq!(out.len(), 5);
        assert_eq!(out[4], b'\n');
        assert!(!out[..4].contains(&b'\n'));
    }

    #[test]
    fn inbound_words_arrive_in_order() {
        let mut codec = SerialCodec::new();
        let mut wire = Vec::new();
        encode_record(&[0x0100, 0x0200, 0x0300], &mut wire);
        codec.feed(&wire);

        assert_eq!(codec.next_event(), Some(SerialEvent::Word(0x0100)));
        assert_eq!(codec.next_event(), Some(SerialEvent::Word(0x0200)));
        assert_eq!(codec.next_event(), Some(SerialEvent::Word(0x0300)));
        assert_eq!(codec.next_event(), None);
    }

    #[test]
    fn records_split_across_feeds_reassemble() {
        let mut codec = SerialCodec::new();
        let mut wire = Vec::new();
        encode_record(&[0x0420], &mut wire);
        let (head, tail) = wire.split_at(1);
        codec.feed(head);
        assert_eq!(codec.next_event(), None);
        codec.feed(tail);
        assert_eq!(codec.next_event(), Some(SerialEvent::Word(0x0420)));
    }

    #[test]
    fn debug_lines_are_surfaced_with_token_stripped() {
        let mut codec = SerialCodec::new();
        codec.feed(b"[DEBUG] poll miss on station 3\n");
        assert_eq!(
            codec.next_event(),
            Some(SerialEvent::DebugLine("poll miss on station 3".into()))
        );
    }

    #[test]
    fn eotx_line_becomes_transmission_complete() {
        let mut codec = SerialCodec::new();
        codec.feed(b"[EOTX]\r\n");
        assert_eq!(codec.next_event(), Some(SerialEvent::EndOfTransmission));
    }

    #[test]
    fn odd_payload_length_is_malformed() {
        let mut codec = SerialCodec::new();
        codec.feed(b"@AB\n");
        assert_eq!(codec.next_event(), Some(SerialEvent::Malformed { len: 3 }));
        assert_eq!(codec.next_event(), None);
    }

    #[test]
    fn token_and_word_ordering_is_preserved_across_records() {
        let mut codec = SerialCodec::new();
        let mut wire = Vec::new();
        encode_record(&[0x0100], &mut wire);
        wire.extend_from_slice(b"[EOTX]\n");
        encode_record(&[0x0200], &mut wire);
        codec.feed(&wire);

        assert_eq!(codec.next_event(), Some(SerialEvent::Word(0x0100)));
        assert_eq!(codec.next_event(), Some(SerialEvent::EndOfTransmission));
        assert_eq!(codec.next_event(), Some(SerialEvent::Word(0x0200)));
    }
}
