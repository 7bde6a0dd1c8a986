// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! `txmux`: attach 5250 twinax terminals to shell sessions.
//!
//! ```text
//! txmux -t /dev/ttyUSB0 0 2:typewriter:slow 3:enhanced:normal:cp285
//! ```

use std::path::PathBuf;

use clap::Parser;
use twinax_mux::{
    Config, Scheduler, TwinaxError,
    config::AdminEndpoint,
    error::exit_code,
};

#[derive(Debug, Parser)]
#[command(
    name = "txmux",
    version,
    about = "5250 twinax terminal to PTY session converter",
    arg_required_else_help = true
)]
struct CliArg {
    /// Stations to serve: addr[:dict[:poll[:codepage]]], addr 0..=6.
    #[arg(value_name = "STATION", required = true)]
    stations: Vec<String>,

    /// Serial device of the twinax line driver.
    #[arg(short = 't', value_name = "DEVICE", default_value = "/dev/ttyUSB0")]
    tty: PathBuf,

    /// Start with the keyboard clicker silent.
    #[arg(short = 's')]
    silent: bool,

    /// Log frame-level serial traffic.
    #[arg(short = 'c')]
    log_frames: bool,

    /// Log raw scancodes.
    #[arg(short = 'k')]
    log_scancodes: bool,

    /// Log PTY I/O.
    #[arg(short = 'i')]
    log_ptyio: bool,

    /// Daemon mode (logs to /tmp/debug.log).
    #[arg(short = 'd')]
    daemon: bool,

    /// Expose the admin shell on TCP port 5251.
    #[arg(short = 'p', conflicts_with = "unix_socket")]
    tcp: bool,

    /// Expose the admin shell on /tmp/5250_cmd_sock.
    #[arg(short = 'u')]
    unix_socket: bool,

    /// Run full login sessions instead of plain shells.
    #[arg(short = 'l')]
    login: bool,

    /// Directory with the bundled compiled terminfo.
    #[arg(long, value_name = "DIR")]
    terminfo: Option<PathBuf>,
}

fn main() {
    let cli_arg = CliArg::parse();
    let code = match try_main(cli_arg) {
        Ok(()) => exit_code::CLEAN,
        Err(error) => {
            let code = error.exit_code();
            eprintln!("{:?}", miette::Report::new(error));
            code
        }
    };
    std::process::exit(code);
}

fn try_main(cli_arg: CliArg) -> Result<(), TwinaxError> {
    let config = build_config(cli_arg)?;

    let _log_guard = twinax_mux::log::try_init(&config).map_err(|e| {
        TwinaxError::Config {
            spec: String::new(),
            reason: format!("logging setup failed: {e}"),
        }
    })?;

    if config.daemon {
        // Daemonization proper is the wrapper script's job; the flag only
        // redirects the log file.
        tracing::warn!("daemon flag set; staying in the foreground");
    }
    if config.admin != AdminEndpoint::None {
        tracing::info!(admin = ?config.admin, "admin shell endpoint configured");
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| TwinaxError::Config {
            spec: String::new(),
            reason: format!("tokio runtime: {e}"),
        })?;

    runtime.block_on(async {
        let scheduler = Scheduler::new(config)?;
        scheduler.run().await
    })
}

fn build_config(cli_arg: CliArg) -> Result<Config, TwinaxError> {
    let stations = cli_arg
        .stations
        .iter()
        .map(|s| s.parse())
        .collect::<Result<Vec<_>, _>>()?;

    let admin = if cli_arg.tcp {
        AdminEndpoint::Tcp
    } else if cli_arg.unix_socket {
        AdminEndpoint::UnixSocket
    } else {
        AdminEndpoint::None
    };

    let config = Config {
        device: cli_arg.tty,
        stations,
        clicker_silent: cli_arg.silent,
        log_frames: cli_arg.log_frames,
        log_scancodes: cli_arg.log_scancodes,
        log_ptyio: cli_arg.log_ptyio,
        daemon: cli_arg.daemon,
        login_mode: cli_arg.login,
        admin,
        terminfo_dir: cli_arg.terminfo,
    };
    config.validate()?;
    Ok(config)
}
