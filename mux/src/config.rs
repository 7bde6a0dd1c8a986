// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Runtime configuration: the station table and the global switches.
//!
//! Everything mutable-looking in the original converter (keyboard
//! dictionaries, codepage state, debug flags) is resolved here once, at
//! startup, into an immutable `Config` handed to the scheduler. Per-session
//! deviations live on the sessions themselves.

use std::{path::PathBuf, str::FromStr};

use crate::{
    charset::Codepage,
    error::TwinaxError,
    keyboard::ScancodeDictionary,
    station::{PollCadence, frame::MAX_STATION_ADDR},
};

/// One positional CLI argument: `addr[:dict[:poll[:codepage]]]`.
#[derive(Debug, Clone, Copy)]
pub struct StationSpec {
    pub addr: u8,
    pub dict: &'static ScancodeDictionary,
    pub cadence: PollCadence,
    pub codepage: &'static Codepage,
}

impl FromStr for StationSpec {
    type Err = TwinaxError;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let err = |reason: &str| TwinaxError::Config {
            spec: spec.to_string(),
            reason: reason.to_string(),
        };

        let mut parts = spec.split(':');
        let addr_part = parts.next().unwrap_or_default();
        let addr: u8 = addr_part
            .parse()
            .map_err(|_| err("station address is not a number"))?;
        if addr > MAX_STATION_ADDR {
            return Err(err("station address must be 0..=6"));
        }

        let dict = match parts.next() {
            None | Some("") => ScancodeDictionary::default_dictionary(),
            Some(name) => {
                ScancodeDictionary::by_name(name).ok_or_else(|| err("unknown dictionary"))?
            }
        };
        let cadence = match parts.next() {
            None | Some("") => PollCadence::default(),
            Some(name) => PollCadence::parse(name).ok_or_else(|| err("unknown poll rate"))?,
        };
        let codepage = match parts.next() {
            None | Some("") => Codepage::default_codepage(),
            Some(name) => Codepage::by_name(name).ok_or_else(|| err("unknown codepage"))?,
        };
        if parts.next().is_some() {
            return Err(err("too many fields"));
        }

        Ok(StationSpec {
            addr,
            dict,
            cadence,
            codepage,
        })
    }
}

/// How the admin shell is exposed. Connection handling lives outside the
/// core; the scheduler only needs to know the choice was made.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AdminEndpoint {
    #[default]
    None,
    Tcp,
    UnixSocket,
}

#[derive(Debug)]
pub struct Config {
    pub device: PathBuf,
    pub stations: Vec<StationSpec>,
    /// Start sessions with the keyboard clicker silenced (`-s`).
    pub clicker_silent: bool,
    /// Frame-level logging (`-c`).
    pub log_frames: bool,
    /// Scancode logging (`-k`).
    pub log_scancodes: bool,
    /// PTY I/O logging (`-i`).
    pub log_ptyio: bool,
    /// Daemon mode requested (`-d`); here it only moves the log file.
    pub daemon: bool,
    /// Spawn full login sessions (`-l`).
    pub login_mode: bool,
    pub admin: AdminEndpoint,
    /// Bundled compiled terminfo, when shipped alongside the binary.
    pub terminfo_dir: Option<PathBuf>,
}

impl Config {
    /// Validate the station list: at least one station, no duplicates.
    ///
    /// # Errors
    ///
    /// Returns [`TwinaxError::Config`] on an empty or conflicting list.
    pub fn validate(&self) -> Result<(), TwinaxError> {
        let err = |spec: String, reason: &str| TwinaxError::Config {
            spec,
            reason: reason.to_string(),
        };
        if self.stations.is_empty() {
            return Err(err(String::new(), "at least one station is required"));
        }
        for (i, station) in self.stations.iter().enumerate() {
            if self.stations[..i].iter().any(|s| s.addr == station.addr) {
                return Err(err(
                    station.addr.to_string(),
                    "station address listed twice",
                ));
            }
        }
        Ok(())
    }
}
