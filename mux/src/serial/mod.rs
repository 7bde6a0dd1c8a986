// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Serial link: record codec and device plumbing.

pub mod codec;
pub mod port;

pub use codec::{SerialCodec, SerialEvent, decode_pair, encode_record, encode_word};
pub use port::SerialPort;
