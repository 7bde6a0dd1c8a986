// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! A session: one attached station's shell, screen, and keyboard state.
//!
//! The session carries only its station address back into the scheduler's
//! table; ownership runs strictly downward (scheduler → slot → session).
//! Shell output is staged in a ring so one chatty child cannot starve the
//! other stations: the PTY pump and the paint step each run under a fixed
//! per-tick budget.

pub mod pty;

use std::collections::VecDeque;

use pty::{LoginCommandBuilder, PtyInputEvent, PtyOutputEvent, PtySession};

use crate::{
    charset::{Codepage, SessionCharset},
    display::DisplayController,
    error::TwinaxError,
    keyboard::{KeyboardState, ScancodeDictionary},
};

/// Staged shell output awaiting paint.
const RING_CAPACITY: usize = 64 * 1024;

/// Bytes interpreted into the display per paint call.
const PAINT_BUDGET: usize = 2048;

/// PTY events drained per pump call.
const PUMP_BUDGET: usize = 16;

#[derive(Debug)]
pub struct Session {
    addr: u8,
    pub display: DisplayController,
    pub keyboard: KeyboardState,
    pub charset: SessionCharset,
    pub clicker_enabled: bool,
    pty: PtySession,
    paint_ring: VecDeque<u8>,
    child_exited: bool,
}

impl Session {
    /// Spawn the login process and assemble the session state.
    ///
    /// # Errors
    ///
    /// Returns [`TwinaxError::PtySpawn`] when the PTY or the child cannot
    /// be created.
    pub fn spawn(
        addr: u8,
        dict: &'static ScancodeDictionary,
        codepage: &'static Codepage,
        clicker_enabled: bool,
        login_mode: bool,
        terminfo_dir: Option<&std::path::Path>,
    ) -> Result<Self, TwinaxError> {
        let pty = LoginCommandBuilder::for_session(login_mode)
            .terminal_env(terminfo_dir)
            .spawn(addr)?;

        Ok(Self {
            addr,
            display: DisplayController::new(),
            keyboard: KeyboardState::new(dict),
            charset: SessionCharset::new(codepage),
            clicker_enabled,
            pty,
            paint_ring: VecDeque::new(),
            child_exited: false,
        })
    }

    #[must_use]
    pub fn addr(&self) -> u8 { self.addr }

    /// Whether the child is gone (exit observed or write side dead).
    #[must_use]
    pub fn child_exited(&self) -> bool { self.child_exited }

    /// Move pending PTY output into the paint ring, bounded per call.
    ///
    /// Stops early when the ring is full; the child's output stays queued
    /// in the channel and backpressure does the rest.
    pub fn pump_pty(&mut self) {
        for _ in 0..PUMP_BUDGET {
            if self.paint_ring.len() >= RING_CAPACITY {
                break;
            }
            match self.pty.output_rx.try_recv() {
                Ok(PtyOutputEvent::Output(bytes)) => {
                    tracing::trace!(
                        target: "twinax_mux::ptyio",
                        addr = self.addr,
                        len = bytes.len(),
                        "pty output"
                    );
                    self.paint_ring.extend(bytes);
                }
                Ok(PtyOutputEvent::Exit(status)) => {
                    tracing::info!(addr = self.addr, ?status, "child exited");
                    self.child_exited = true;
                }
                Ok(PtyOutputEvent::WriteError(e)) => {
                    tracing::warn!(addr = self.addr, error = %e, "pty write failed");
                    self.child_exited = true;
                }
                Err(_) => break,
            }
        }
    }

    /// Interpret one budget's worth of staged output, and bounce any
    /// terminal replies (VT52 identify) back into the PTY.
    pub fn paint(&mut self) {
        if !self.paint_ring.is_empty() {
            let take = self.paint_ring.len().min(PAINT_BUDGET);
            let chunk: Vec<u8> = self.paint_ring.drain(..take).collect();
            self.display.apply_bytes(&chunk, &self.charset);
        }
        if let Some(reply) = self.display.take_reply() {
            self.write_to_pty(reply.to_vec());
        }
    }

    /// Feed one scancode through the decoder and forward the result.
    pub fn handle_scancode(&mut self, scancode: u8, log_scancodes: bool) {
        if log_scancodes {
            tracing::debug!(
                target: "twinax_mux::scancode",
                addr = self.addr,
                scancode,
                "scancode received"
            );
        }
        if let Some(bytes) = self.keyboard.decode(scancode) {
            self.write_to_pty(bytes.to_vec());
        }
    }

    fn write_to_pty(&mut self, bytes: Vec<u8>) {
        if self.pty.input_tx.send(PtyInputEvent::Write(bytes)).is_err() {
            // Input task is gone; treat like a dead child.
            self.child_exited = true;
        }
    }

    /// Tear the session down: hang up the line and reap the child.
    pub fn teardown(self) {
        tracing::info!(addr = self.addr, "session teardown");
        self.pty.hang_up_and_reap();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{charset::CP037, keyboard::ENHANCED};

    /// Spawning a real PTY with a short-lived child: output reaches the
    /// display and the exit is observed.
    #[tokio::test(flavor = "multi_thread")]
    async fn shell_output_lands_on_the_screen() {
        let pty = LoginCommandBuilder::new("/bin/sh")
            .args(["-c", "printf hello"])
            .terminal_env(None)
            .spawn(0)
            .expect("pty spawn");

        let mut session = Session {
            addr: 0,
            display: DisplayController::new(),
            keyboard: KeyboardState::new(&ENHANCED),
            charset: SessionCharset::new(&CP037),
            clicker_enabled: true,
            pty,
            paint_ring: VecDeque::new(),
            child_exited: false,
        };

        // Give the child a moment, then pump until exit is seen.
        for _ in 0..200 {
            session.pump_pty();
            session.paint();
            if session.child_exited() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(session.child_exited(), "child should have exited");
        // Drain whatever is still staged.
        for _ in 0..100 {
            session.pump_pty();
            session.paint();
        }

        // "hello" in EBCDIC at row 0.
        let screen = session.display.screen();
        let expect = [0x88, 0x85, 0x93, 0x93, 0x96]; // h e l l o
        for (col, &ch) in expect.iter().enumerate() {
            assert_eq!(screen.cell(0, col).ch, ch, "column {col}");
        }
        session.teardown();
    }
}
