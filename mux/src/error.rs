// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Typed error kinds and the process exit-code policy.
//!
//! Only serial-link failures are global-fatal; every other kind is contained
//! at the station or session that raised it, so most variants here surface
//! as log lines and counters rather than propagated errors.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Process exit codes the `txmux` binary commits to.
pub mod exit_code {
    pub const CLEAN: i32 = 0;
    pub const CONFIG: i32 = 1;
    pub const SERIAL_OPEN: i32 = 2;
    pub const PTY_ALLOC: i32 = 3;
}

#[derive(Debug, Error, Diagnostic)]
pub enum TwinaxError {
    #[error("cannot open serial device {device}: {source}")]
    #[diagnostic(help("check the -t path and that the line driver is plugged in"))]
    SerialOpen {
        device: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serial write failed: {0}")]
    SerialWrite(#[source] std::io::Error),

    #[error("serial read failed: {0}")]
    SerialRead(#[source] std::io::Error),

    #[error("PTY allocation failed for station {addr}: {detail}")]
    PtySpawn { addr: u8, detail: String },

    #[error("PTY write to station {addr} session failed: {source}")]
    PtyWrite {
        addr: u8,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid station spec {spec:?}: {reason}")]
    #[diagnostic(help("station specs are addr[:dict[:poll[:codepage]]], addr 0..=6"))]
    Config { spec: String, reason: String },
}

impl TwinaxError {
    /// Map an error to the documented process exit code.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            TwinaxError::Config { .. } => exit_code::CONFIG,
            TwinaxError::SerialOpen { .. }
            | TwinaxError::SerialWrite(_)
            | TwinaxError::SerialRead(_) => exit_code::SERIAL_OPEN,
            TwinaxError::PtySpawn { .. } => exit_code::PTY_ALLOC,
            TwinaxError::PtyWrite { .. } => exit_code::CLEAN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_match_the_documented_policy() {
        let config = TwinaxError::Config {
            spec: "9".into(),
            reason: "address out of range".into(),
        };
        assert_eq!(config.exit_code(), exit_code::CONFIG);

        let serial = TwinaxError::SerialOpen {
            device: "/dev/ttyUSB0".into(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert_eq!(serial.exit_code(), exit_code::SERIAL_OPEN);

        let pty = TwinaxError::PtySpawn {
            addr: 0,
            detail: "out of ptys".into(),
        };
        assert_eq!(pty.exit_code(), exit_code::PTY_ALLOC);
    }
}
