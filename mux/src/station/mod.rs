// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Per-station protocol machinery: frame layout, write-burst encoding, and
//! the polling state machine.

pub mod burst;
pub mod engine;
pub mod frame;

use std::time::Duration;

pub use burst::encode_write_burst;
pub use engine::{EngineEvent, Expect, StationEngine, StationState, TxAction};
pub use frame::{Command, Response, StatusIndicators};

/// Poll pacing for one station, fixed at attach time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum PollCadence {
    /// Nominal pacing for responsive terminals.
    #[default]
    Normal,
    /// Relaxed pacing for long cable runs and older electronics.
    Slow,
    /// Debug pacing, leisurely enough to watch with a logic probe.
    VerySlow,
}

impl PollCadence {
    /// Interval between consecutive polls to one station.
    #[must_use]
    pub fn interval(self) -> Duration {
        match self {
            PollCadence::Normal => Duration::from_micros(650),
            PollCadence::Slow => Duration::from_millis(10),
            PollCadence::VerySlow => Duration::from_millis(250),
        }
    }

    /// Parse the CLI spelling used in station specs.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "normal" => Some(PollCadence::Normal),
            "slow" => Some(PollCadence::Slow),
            "veryslow" | "debug" => Some(PollCadence::VerySlow),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cadence_parses_cli_spellings() {
        assert_eq!(PollCadence::parse("normal"), Some(PollCadence::Normal));
        assert_eq!(PollCadence::parse("slow"), Some(PollCadence::Slow));
        assert_eq!(PollCadence::parse("debug"), Some(PollCadence::VerySlow));
        assert_eq!(PollCadence::parse("fast"), None);
    }

    #[test]
    fn cadence_intervals_are_ordered() {
        assert!(PollCadence::Normal.interval() < PollCadence::Slow.interval());
        assert!(PollCadence::Slow.interval() < PollCadence::VerySlow.interval());
    }
}
