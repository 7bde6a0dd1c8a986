// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! PTY plumbing for one login session.
//!
//! Each attached station gets a PTY pair with the login process on the
//! controlled side. Two blocking tasks service the controller half — one
//! reading output, one owning the controller and writing input — bridged
//! to the async world through unbounded channels, so the scheduler only
//! ever does channel operations. Dropping the controller (input task exit)
//! hangs up the line; a grace timer then hard-kills anything still alive.

use std::io::{Read, Write};

use portable_pty::{ChildKiller, CommandBuilder, PtySize, native_pty_system};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use crate::{
    display::{SCREEN_COLS, SCREEN_ROWS},
    error::TwinaxError,
};

/// Read chunk size for PTY output (4KB stack allocation).
pub const READ_BUFFER_SIZE: usize = 4096;

/// How long a hung-up child gets before the hard kill.
pub const KILL_GRACE: std::time::Duration = std::time::Duration::from_millis(500);

/// `TERM` value when the bundled terminfo is available.
pub const TERM_CONVERTER: &str = "5250cvt";

/// `TERM` fallback understood everywhere.
pub const TERM_FALLBACK: &str = "vt52";

/// Output events from the child process.
#[derive(Debug)]
pub enum PtyOutputEvent {
    /// Raw output data (stdout/stderr combined).
    Output(Vec<u8>),
    /// Process exited with status.
    Exit(portable_pty::ExitStatus),
    /// Write side failed; the session is dead.
    WriteError(std::io::Error),
}

/// Input events for the child process.
#[derive(Debug, Clone)]
pub enum PtyInputEvent {
    /// Raw bytes for the child's stdin.
    Write(Vec<u8>),
    /// Hang up: stop the input task and drop the controller.
    Close,
}

/// Builder for the per-session login command.
#[derive(Debug)]
pub struct LoginCommandBuilder {
    program: String,
    args: Vec<String>,
    env_vars: Vec<(String, String)>,
}

impl LoginCommandBuilder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env_vars: Vec::new(),
        }
    }

    /// The standard session command: `/bin/login` in login mode, the
    /// user's shell otherwise.
    #[must_use]
    pub fn for_session(login_mode: bool) -> Self {
        if login_mode {
            Self::new("/bin/login")
        } else {
            let shell =
                std::env::var("SHELL").unwrap_or_else(|_| String::from("/bin/sh"));
            Self::new(shell)
        }
    }

    #[must_use]
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    /// Set `TERM` (and `TERMINFO` when the bundled database is present).
    #[must_use]
    pub fn terminal_env(self, terminfo_dir: Option<&std::path::Path>) -> Self {
        match terminfo_dir {
            Some(dir) if dir.is_dir() => self
                .env("TERM", TERM_CONVERTER)
                .env("TERMINFO", dir.display().to_string()),
            _ => self.env("TERM", TERM_FALLBACK),
        }
    }

    /// Open the PTY pair, spawn the command on the controlled side, and
    /// start the service tasks.
    ///
    /// # Errors
    ///
    /// Returns [`TwinaxError::PtySpawn`] if the PTY cannot be allocated or
    /// the command cannot be spawned.
    pub fn spawn(self, addr: u8) -> Result<PtySession, TwinaxError> {
        let spawn_err = |detail: String| TwinaxError::PtySpawn { addr, detail };

        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: SCREEN_ROWS as u16,
                cols: SCREEN_COLS as u16,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| spawn_err(format!("openpty: {e}")))?;

        let mut command = CommandBuilder::new(&self.program);
        command.args(&self.args);
        for (key, value) in &self.env_vars {
            command.env(key, value);
        }
        if let Ok(cwd) = std::env::current_dir() {
            command.cwd(cwd);
        }

        let mut child = pair
            .slave
            .spawn_command(command)
            .map_err(|e| spawn_err(format!("spawn {}: {e}", self.program)))?;
        let killer = child.clone_killer();
        // The controlled half belongs to the child now.
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| spawn_err(format!("clone reader: {e}")))?;

        let (output_tx, output_rx) = unbounded_channel::<PtyOutputEvent>();
        let (input_tx, input_rx) = unbounded_channel::<PtyInputEvent>();

        spawn_reader_task(reader, output_tx.clone());
        spawn_input_task(pair.master, input_rx, output_tx.clone());
        spawn_wait_task(child, output_tx);

        Ok(PtySession {
            input_tx,
            output_rx,
            killer,
        })
    }
}

/// Channel ends and kill handle for one live PTY.
pub struct PtySession {
    /// Send input TO the child process.
    pub input_tx: UnboundedSender<PtyInputEvent>,
    /// Receive output FROM the child process.
    pub output_rx: UnboundedReceiver<PtyOutputEvent>,
    killer: Box<dyn ChildKiller + Send + Sync>,
}

impl std::fmt::Debug for PtySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PtySession").finish_non_exhaustive()
    }
}

impl PtySession {
    /// Hang up, then hard-kill after [`KILL_GRACE`].
    ///
    /// Sending `Close` makes the input task exit and drop the controller,
    /// which delivers SIGHUP to the child's process group; the detached
    /// grace task mops up anything that ignored it.
    pub fn hang_up_and_reap(mut self) {
        let _unused = self.input_tx.send(PtyInputEvent::Close);
        tokio::spawn(async move {
            tokio::time::sleep(KILL_GRACE).await;
            if let Err(e) = self.killer.kill() {
                // Already gone is the expected case.
                tracing::debug!("post-grace kill: {e}");
            }
        });
    }
}

fn spawn_reader_task(
    mut reader: Box<dyn Read + Send>,
    output_tx: UnboundedSender<PtyOutputEvent>,
) {
    tokio::task::spawn_blocking(move || {
        let mut buf = [0u8; READ_BUFFER_SIZE];
        loop {
            match reader.read(&mut buf) {
                // EOF or error: controller closed or child gone.
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if output_tx
                        .send(PtyOutputEvent::Output(buf[..n].to_vec()))
                        .is_err()
                    {
                        break;
                    }
                }
            }
        }
    });
}

/// The input task owns the controller so writes, and the eventual hangup,
/// have a single home.
fn spawn_input_task(
    controller: Box<dyn portable_pty::MasterPty + Send>,
    mut input_rx: UnboundedReceiver<PtyInputEvent>,
    output_tx: UnboundedSender<PtyOutputEvent>,
) {
    tokio::task::spawn_blocking(move || {
        let mut writer = match controller.take_writer() {
            Ok(writer) => writer,
            Err(e) => {
                let _unused = output_tx.send(PtyOutputEvent::WriteError(
                    std::io::Error::other(e.to_string()),
                ));
                return;
            }
        };
        while let Some(event) = input_rx.blocking_recv() {
            match event {
                PtyInputEvent::Write(bytes) => {
                    if let Err(e) =
                        writer.write_all(&bytes).and_then(|()| writer.flush())
                    {
                        let _unused = output_tx.send(PtyOutputEvent::WriteError(e));
                        break;
                    }
                }
                PtyInputEvent::Close => break,
            }
        }
        // Controller drops here: hangup for the child's session.
        drop(controller);
    });
}

fn spawn_wait_task(
    mut child: Box<dyn portable_pty::Child + Send + Sync>,
    output_tx: UnboundedSender<PtyOutputEvent>,
) {
    tokio::task::spawn_blocking(move || match child.wait() {
        Ok(status) => {
            let _unused = output_tx.send(PtyOutputEvent::Exit(status));
        }
        Err(e) => {
            let _unused = output_tx.send(PtyOutputEvent::WriteError(e));
        }
    });
}
