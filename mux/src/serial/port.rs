// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Serial device setup and nonblocking I/O for the firmware link.
//!
//! The device is opened `O_RDWR | O_NOCTTY | O_NONBLOCK` and programmed to
//! 57600 8N1 raw via rustix's type-safe termios API, then wrapped in a
//! [`tokio::io::unix::AsyncFd`] so the scheduler can fold link readiness
//! into its single `select!` wait. The scheduler owns the only instance;
//! nothing else touches the link.

use std::{os::fd::OwnedFd, path::Path};

use rustix::{
    fs::{Mode, OFlags},
    io::Errno,
    termios::{self, ControlModes, InputModes, LocalModes, OptionalActions, OutputModes,
              SpecialCodeIndex},
};
use tokio::io::{Interest, unix::AsyncFd};

use crate::error::TwinaxError;

pub const BAUD_RATE: u32 = 57600;

#[derive(Debug)]
pub struct SerialPort {
    fd: AsyncFd<OwnedFd>,
}

impl SerialPort {
    /// Open and configure the link device.
    ///
    /// # Errors
    ///
    /// Returns [`TwinaxError::SerialOpen`] if the device cannot be opened or
    /// its line discipline cannot be programmed.
    pub fn open(device: &Path) -> Result<Self, TwinaxError> {
        let open_err = |source: std::io::Error| TwinaxError::SerialOpen {
            device: device.to_path_buf(),
            source,
        };

        let fd = rustix::fs::open(
            device,
            OFlags::RDWR | OFlags::NOCTTY | OFlags::NONBLOCK,
            Mode::empty(),
        )
        .map_err(|e| open_err(e.into()))?;

        let mut tio = termios::tcgetattr(&fd).map_err(|e| open_err(e.into()))?;

        // Raw byte pipe, based on cfmakeraw().
        tio.input_modes.remove(
            InputModes::IGNBRK
                | InputModes::BRKINT
                | InputModes::PARMRK
                | InputModes::ISTRIP
                | InputModes::INLCR
                | InputModes::IGNCR
                | InputModes::ICRNL
                | InputModes::IXON,
        );
        tio.output_modes.remove(OutputModes::OPOST);
        tio.local_modes.remove(
            LocalModes::ECHO
                | LocalModes::ECHONL
                | LocalModes::ICANON
                | LocalModes::ISIG
                | LocalModes::IEXTEN,
        );
        tio.control_modes
            .remove(ControlModes::CSIZE | ControlModes::PARENB | ControlModes::CSTOPB);
        tio.control_modes.insert(ControlModes::CS8);
        tio.special_codes[SpecialCodeIndex::VMIN] = 0;
        tio.special_codes[SpecialCodeIndex::VTIME] = 0;
        tio.set_speed(BAUD_RATE).map_err(|e| open_err(e.into()))?;

        termios::tcsetattr(&fd, OptionalActions::Flush, &tio)
            .map_err(|e| open_err(e.into()))?;

        let fd = AsyncFd::with_interest(fd, Interest::READABLE | Interest::WRITABLE)
            .map_err(open_err)?;

        Ok(Self { fd })
    }

    /// Wait for link traffic and read one chunk of it into `buf`.
    ///
    /// Suspends until at least one byte is available, so this is safe to use
    /// as a `select!` arm; the read itself never blocks. Readiness is
    /// re-armed on `EAGAIN`, which keeps the fd edge-trigger clean after a
    /// caller has drained the device with [`Self::read_available`].
    ///
    /// # Errors
    ///
    /// Returns [`TwinaxError::SerialRead`] on a hard I/O error.
    pub async fn read_some(&self, buf: &mut [u8]) -> Result<usize, TwinaxError> {
        loop {
            let mut guard = self
                .fd
                .readable()
                .await
                .map_err(TwinaxError::SerialRead)?;
            match rustix::io::read(self.fd.get_ref(), &mut *buf) {
                Ok(n) => return Ok(n),
                Err(Errno::AGAIN) => guard.clear_ready(),
                Err(Errno::INTR) => {}
                Err(e) => return Err(TwinaxError::SerialRead(e.into())),
            }
        }
    }

    /// Drain whatever is immediately available, without waiting.
    ///
    /// Returns zero when the device has nothing more right now. Callers use
    /// this to empty the fd under a bounded budget after [`Self::read_some`]
    /// woke them up.
    ///
    /// # Errors
    ///
    /// Returns [`TwinaxError::SerialRead`] on a hard I/O error.
    pub fn read_available(&self, buf: &mut [u8]) -> Result<usize, TwinaxError> {
        match rustix::io::read(self.fd.get_ref(), buf) {
            Ok(n) => Ok(n),
            Err(Errno::AGAIN | Errno::INTR) => Ok(0),
            Err(e) => Err(TwinaxError::SerialRead(e.into())),
        }
    }

    /// Write a whole record to the link, waiting out `EAGAIN` as needed.
    ///
    /// Records are written back-to-back and never interleaved: the scheduler
    /// is single-threaded and each burst arrives here as one contiguous
    /// slice.
    ///
    /// # Errors
    ///
    /// Returns [`TwinaxError::SerialWrite`] on a hard I/O error; this is
    /// fatal for the whole process.
    pub async fn write_all(&self, bytes: &[u8]) -> Result<(), TwinaxError> {
        let mut written = 0;
        while written < bytes.len() {
            let mut guard = self
                .fd
                .writable()
                .await
                .map_err(TwinaxError::SerialWrite)?;
            match rustix::io::write(self.fd.get_ref(), &bytes[written..]) {
                Ok(n) => written += n,
                Err(Errno::AGAIN) => guard.clear_ready(),
                Err(Errno::INTR) => {}
                Err(e) => return Err(TwinaxError::SerialWrite(e.into())),
            }
        }
        Ok(())
    }
}
