// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Tracing setup.
//!
//! Logs always go to a file so they never race the terminals: `debug.log`
//! in the working directory, or `/tmp/debug.log` when daemon mode was
//! requested. The chatty per-subsystem targets (`twinax_mux::frame`,
//! `::scancode`, `::ptyio`) stay off unless their CLI flag turns them on.

use miette::IntoDiagnostic;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_core::LevelFilter;
use tracing_subscriber::{
    filter::Targets, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::config::Config;

pub const FOREGROUND_LOG: &str = "debug.log";
pub const DAEMON_LOG: &str = "/tmp/debug.log";

pub const FRAME_TARGET: &str = "twinax_mux::frame";
pub const SCANCODE_TARGET: &str = "twinax_mux::scancode";
pub const PTYIO_TARGET: &str = "twinax_mux::ptyio";

/// Install the global subscriber. Hold the returned guard for the life of
/// the process; dropping it stops the background log writer.
///
/// # Errors
///
/// Returns an error when the log file cannot be opened or a subscriber is
/// already installed.
pub fn try_init(config: &Config) -> miette::Result<WorkerGuard> {
    let path = if config.daemon { DAEMON_LOG } else { FOREGROUND_LOG };
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .into_diagnostic()?;
    let (writer, guard) = tracing_appender::non_blocking(file);

    let mut targets = Targets::new().with_default(LevelFilter::INFO);
    if config.log_frames {
        targets = targets.with_target(FRAME_TARGET, LevelFilter::DEBUG);
    }
    if config.log_scancodes {
        targets = targets.with_target(SCANCODE_TARGET, LevelFilter::DEBUG);
    }
    if config.log_ptyio {
        targets = targets.with_target(PTYIO_TARGET, LevelFilter::TRACE);
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false),
        )
        .with(targets)
        .try_init()
        .into_diagnostic()?;

    tracing::info!(log_file = path, "logging initialized");
    Ok(guard)
}
