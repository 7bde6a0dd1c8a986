// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! The session multiplexer / poll scheduler.
//!
//! One cooperative loop drives everything: it multiplexes over the serial
//! fd and a base tick, round-robins the stations for at most one
//! transmission per turn, pumps every session's PTY under fixed budgets,
//! and owns attach/detach/restart. Engines and sessions never block and
//! never see an fd; errors stay confined to the station that raised them,
//! and only serial-link failures abort the loop.
//!
//! Inbound attribution: the protocol is strict request/response, and an
//! absent terminal answers with silence rather than a null response, so
//! the scheduler keeps exactly one transmission in flight on the link.
//! Whatever comes back — a response word, an `[EOTX]` marker, or a
//! deadline expiry — belongs to that transmission, which is how responses
//! find their station without carrying an address. The [`LinkTracker`] is
//! still a queue so a late answer racing its own timeout stays attributed
//! in FIFO order.

use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use tokio::time::MissedTickBehavior;

use crate::{
    config::{Config, StationSpec},
    error::TwinaxError,
    serial::{SerialCodec, SerialEvent, SerialPort, encode_record},
    session::Session,
    station::{
        Command, EngineEvent, Expect, StationEngine, TxAction, encode_write_burst,
    },
};

/// Base tick of the cooperative loop.
const TICK: Duration = Duration::from_micros(500);

/// Serial events processed per loop turn before other stations get a say.
const SERIAL_EVENT_BUDGET: usize = 64;

/// Opportunistic extra reads after a wakeup, before returning to the loop.
const EXTRA_READS: usize = 4;

/// One transmission awaiting its answer on the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inflight {
    pub addr: u8,
    pub expects: Expect,
    pub deadline: Instant,
}

/// FIFO attribution of inbound events to in-flight transmissions.
#[derive(Debug, Default)]
pub struct LinkTracker {
    inflight: VecDeque<Inflight>,
}

impl LinkTracker {
    /// Note a transmission that just went out.
    pub fn record(&mut self, addr: u8, expects: Expect, deadline: Instant) {
        self.inflight.push_back(Inflight {
            addr,
            expects,
            deadline,
        });
    }

    /// Attribute a response word: pops and returns the oldest entry if it
    /// expects one. A stray word (none expected) returns `None` and leaves
    /// the queue alone.
    pub fn resolve_word(&mut self) -> Option<u8> {
        match self.inflight.front() {
            Some(head) if head.expects == Expect::Response => {
                self.inflight.pop_front().map(|i| i.addr)
            }
            _ => None,
        }
    }

    /// Attribute an `[EOTX]` marker, symmetric to [`Self::resolve_word`].
    pub fn resolve_transmit_complete(&mut self) -> Option<u8> {
        match self.inflight.front() {
            Some(head) if head.expects == Expect::TransmitComplete => {
                self.inflight.pop_front().map(|i| i.addr)
            }
            _ => None,
        }
    }

    /// Pop the head if its deadline has passed.
    pub fn pop_expired(&mut self, now: Instant) -> Option<Inflight> {
        if self.inflight.front().is_some_and(|i| i.deadline <= now) {
            self.inflight.pop_front()
        } else {
            None
        }
    }

    #[must_use]
    pub fn len(&self) -> usize { self.inflight.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.inflight.is_empty() }
}

/// One configured station: its spec, its engine, and (when a terminal is
/// attached and initialized) its session.
#[derive(Debug)]
pub struct StationSlot {
    pub spec: StationSpec,
    pub engine: StationEngine,
    pub session: Option<Session>,
}

#[derive(Debug)]
pub struct Scheduler {
    config: Config,
    port: SerialPort,
    codec: SerialCodec,
    slots: Vec<StationSlot>,
    link: LinkTracker,
    rr_next: usize,
}

impl Scheduler {
    /// Validate the configuration, open the serial link, and set up one
    /// slot per configured station.
    ///
    /// # Errors
    ///
    /// Returns a config error for a bad station table or
    /// [`TwinaxError::SerialOpen`] when the device cannot be opened.
    pub fn new(config: Config) -> Result<Self, TwinaxError> {
        config.validate()?;
        let port = SerialPort::open(&config.device)?;
        let slots = config
            .stations
            .iter()
            .map(|&spec| StationSlot {
                spec,
                engine: StationEngine::new(spec.addr, spec.cadence),
                session: None,
            })
            .collect();
        Ok(Self {
            config,
            port,
            codec: SerialCodec::new(),
            slots,
            link: LinkTracker::default(),
            rr_next: 0,
        })
    }

    /// Run until a fatal (serial) error.
    ///
    /// # Errors
    ///
    /// Serial-link failures and PTY allocation failures abort the loop;
    /// everything else is handled in place.
    pub async fn run(mut self) -> Result<(), TwinaxError> {
        tracing::info!(
            device = %self.config.device.display(),
            stations = self.slots.len(),
            "scheduler started"
        );

        let mut tick = tokio::time::interval(TICK);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut buf = [0u8; 4096];

        loop {
            let read = tokio::select! {
                _ = tick.tick() => 0,
                r = self.port.read_some(&mut buf) => r?,
            };
            if read > 0 {
                self.codec.feed(&buf[..read]);
                // The wakeup often means a whole burst of lines; drain a
                // little more before doing protocol work.
                for _ in 0..EXTRA_READS {
                    let n = self.port.read_available(&mut buf)?;
                    if n == 0 {
                        break;
                    }
                    self.codec.feed(&buf[..n]);
                }
            }

            let now = Instant::now();
            self.dispatch_serial_events(now)?;
            self.turn(now).await?;
        }
    }

    /// Explicitly attach a station at runtime.
    pub fn attach(&mut self, spec: StationSpec) {
        if let Some(slot) = self.slots.iter_mut().find(|s| s.spec.addr == spec.addr) {
            slot.spec = spec;
            slot.engine.reset(spec.cadence);
        } else {
            self.slots.push(StationSlot {
                spec,
                engine: StationEngine::new(spec.addr, spec.cadence),
                session: None,
            });
        }
    }

    /// Explicitly detach a station: reap the child, say goodbye on the
    /// wire.
    pub fn detach(&mut self, addr: u8) {
        if let Some(slot) = self.slots.iter_mut().find(|s| s.spec.addr == addr) {
            if let Some(session) = slot.session.take() {
                session.teardown();
            }
            slot.engine.begin_drain();
        }
    }

    /// Detach followed by attach, preserving the station's configuration.
    pub fn restart(&mut self, addr: u8) {
        if let Some(slot) = self.slots.iter_mut().find(|s| s.spec.addr == addr) {
            if let Some(session) = slot.session.take() {
                session.teardown();
            }
            let cadence = slot.spec.cadence;
            slot.engine.reset(cadence);
        }
    }

    /// Route decoded serial events to their stations, under budget.
    fn dispatch_serial_events(&mut self, now: Instant) -> Result<(), TwinaxError> {
        for _ in 0..SERIAL_EVENT_BUDGET {
            let Some(event) = self.codec.next_event() else {
                break;
            };
            match event {
                SerialEvent::Word(word) => {
                    if self.config.log_frames {
                        tracing::debug!(target: "twinax_mux::frame", word, "rx");
                    }
                    match self.link.resolve_word() {
                        Some(addr) => self.route_word(addr, word, now)?,
                        None => {
                            tracing::warn!(
                                target: "twinax_mux::frame",
                                word,
                                "stray response word"
                            );
                        }
                    }
                }
                SerialEvent::EndOfTransmission => {
                    match self.link.resolve_transmit_complete() {
                        Some(addr) => {
                            if let Some(idx) = self.slot_index(addr) {
                                self.slots[idx].engine.handle_transmit_complete();
                            }
                        }
                        None => {
                            tracing::warn!(
                                target: "twinax_mux::frame",
                                "stray transmission-complete marker"
                            );
                        }
                    }
                }
                SerialEvent::DebugLine(text) => {
                    tracing::debug!(target: "twinax_mux::frame", "[firmware] {text}");
                }
                SerialEvent::Malformed { len } => {
                    tracing::warn!(target: "twinax_mux::frame", len, "malformed record skipped");
                }
            }
        }
        Ok(())
    }

    fn route_word(
        &mut self,
        addr: u8,
        word: u16,
        now: Instant,
    ) -> Result<(), TwinaxError> {
        let Some(idx) = self.slot_index(addr) else {
            return Ok(());
        };
        let events = self.slots[idx].engine.handle_word(word, now);
        self.apply_events(idx, &events)
    }

    /// One cooperative turn: timeouts, session pumps, burst staging, and
    /// at most one transmission chosen round-robin.
    async fn turn(&mut self, now: Instant) -> Result<(), TwinaxError> {
        while let Some(expired) = self.link.pop_expired(now) {
            if let Some(idx) = self.slot_index(expired.addr) {
                let events = self.slots[idx].engine.handle_timeout(now);
                self.apply_events(idx, &events)?;
            }
        }

        for idx in 0..self.slots.len() {
            let slot = &mut self.slots[idx];
            let Some(session) = slot.session.as_mut() else {
                continue;
            };
            session.pump_pty();
            session.paint();
            if session.child_exited() {
                // Scenario: shell exit tears the session down; the station
                // drains and will re-initialize on the next sign of life.
                if let Some(session) = slot.session.take() {
                    session.teardown();
                }
                slot.engine.begin_drain();
            }
        }

        for slot in &mut self.slots {
            let Some(session) = slot.session.as_mut() else {
                continue;
            };
            if slot.engine.ready_for_write() && session.display.needs_write() {
                let spans = session.display.take_dirty();
                let words = encode_write_burst(slot.spec.addr, &spans, &session.display);
                slot.engine.enqueue_burst(words);
            }
        }

        // One transaction on the link at a time; the next station gets its
        // turn once this one is answered or timed out.
        if self.link.is_empty() {
            let slot_count = self.slots.len();
            for offset in 0..slot_count {
                let idx = (self.rr_next + offset) % slot_count;
                if let Some(tx) = self.slots[idx].engine.tick(now) {
                    self.rr_next = (idx + 1) % slot_count;
                    self.transmit(idx, &tx, now).await?;
                    break;
                }
            }
        }
        Ok(())
    }

    async fn transmit(
        &mut self,
        idx: usize,
        tx: &TxAction,
        now: Instant,
    ) -> Result<(), TwinaxError> {
        let addr = self.slots[idx].spec.addr;
        if self.config.log_frames {
            tracing::debug!(
                target: "twinax_mux::frame",
                addr,
                words = tx.words.len(),
                expects = ?tx.expects,
                "tx"
            );
        }
        let mut wire = Vec::new();
        encode_record(&tx.words, &mut wire);
        self.port.write_all(&wire).await?;

        let deadline = self.slots[idx]
            .engine
            .outstanding_deadline()
            .unwrap_or(now + TICK * 32);
        self.link.record(addr, tx.expects, deadline);
        Ok(())
    }

    fn apply_events(
        &mut self,
        idx: usize,
        events: &[EngineEvent],
    ) -> Result<(), TwinaxError> {
        for &event in events {
            match event {
                EngineEvent::BecameReady => {
                    let slot = &mut self.slots[idx];
                    let spec = slot.spec;
                    let session = Session::spawn(
                        spec.addr,
                        spec.dict,
                        spec.codepage,
                        !self.config.clicker_silent,
                        self.config.login_mode,
                        self.config.terminfo_dir.as_deref(),
                    )?;
                    if session.clicker_enabled {
                        slot.engine.enqueue_command(Command::SetIndicators);
                    }
                    slot.session = Some(session);
                }
                EngineEvent::SessionLost => {
                    if let Some(session) = self.slots[idx].session.take() {
                        session.teardown();
                    }
                }
                EngineEvent::Scancode(scancode) => {
                    let log_scancodes = self.config.log_scancodes;
                    if let Some(session) = self.slots[idx].session.as_mut() {
                        session.handle_scancode(scancode, log_scancodes);
                    }
                }
                EngineEvent::Status(indicators) => {
                    if let Some(session) = self.slots[idx].session.as_mut() {
                        session
                            .display
                            .report_indicators(indicators, &session.charset);
                    }
                }
            }
        }
        Ok(())
    }

    fn slot_index(&self, addr: u8) -> Option<usize> {
        self.slots.iter().position(|s| s.spec.addr == addr)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::station::{
        PollCadence, StationState,
        frame::{RESPONSE_CLASS_NULL, RESPONSE_CLASS_STATUS, make_response},
    };

    #[test]
    fn link_tracker_attributes_in_fifo_order() {
        let mut link = LinkTracker::default();
        let deadline = Instant::now() + Duration::from_secs(1);
        link.record(0, Expect::Response, deadline);
        link.record(3, Expect::TransmitComplete, deadline);
        link.record(5, Expect::Response, deadline);

        assert_eq!(link.resolve_word(), Some(0));
        // Head now expects EOTX; a word cannot resolve it.
        assert_eq!(link.resolve_word(), None);
        assert_eq!(link.resolve_transmit_complete(), Some(3));
        assert_eq!(link.resolve_word(), Some(5));
        assert!(link.is_empty());
    }

    #[test]
    fn expired_heads_pop_in_order() {
        let mut link = LinkTracker::default();
        let now = Instant::now();
        link.record(1, Expect::Response, now + Duration::from_millis(5));
        link.record(2, Expect::Response, now + Duration::from_millis(50));

        assert!(link.pop_expired(now).is_none());
        let later = now + Duration::from_millis(10);
        assert_eq!(link.pop_expired(later).map(|i| i.addr), Some(1));
        assert!(link.pop_expired(later).is_none());
    }

    /// The protocol stack wired together minus the fds: engine
    /// transmissions encoded through the codec, firmware lines decoded
    /// back, responses attributed through the link tracker.
    #[test]
    fn cold_attach_over_the_codec_pipeline() {
        let mut engine = StationEngine::new(2, PollCadence::Normal);
        let mut codec = SerialCodec::new();
        let mut link = LinkTracker::default();
        let mut t = Instant::now();

        let ack = make_response(RESPONSE_CLASS_STATUS, 0x08);
        let keyboard_id = make_response(crate::station::frame::RESPONSE_CLASS_SCANCODE, 0x42);
        let null = make_response(RESPONSE_CLASS_NULL, 0);
        let firmware_script = [null, ack, keyboard_id, ack, ack];

        for reply in firmware_script {
            t += PollCadence::Normal.interval();
            let tx = engine.tick(t).expect("transmission due");

            // Host side: words → record bytes on the wire.
            let mut wire = Vec::new();
            encode_record(&tx.words, &mut wire);
            assert_eq!(wire.len(), tx.words.len() * 2 + 1);
            link.record(2, tx.expects, t + Duration::from_secs(1));

            // Firmware side: answer with one response record.
            let mut inbound = Vec::new();
            encode_record(&[reply], &mut inbound);
            codec.feed(&inbound);

            let Some(SerialEvent::Word(word)) = codec.next_event() else {
                panic!("expected a response word");
            };
            let addr = link.resolve_word().expect("attributed");
            assert_eq!(addr, 2);
            let _ = engine.handle_word(word, t);
        }

        assert_eq!(engine.state(), StationState::Ready);
        assert_eq!(engine.keyboard_id(), Some(0x42));
    }

    /// Lifecycle plumbing against a pty master standing in for the line
    /// driver: attach adds a slot, detach drains, restart resets.
    #[tokio::test]
    async fn attach_detach_restart_drive_engine_state() {
        let config = crate::Config {
            device: "/dev/ptmx".into(),
            stations: vec!["0".parse().unwrap()],
            clicker_silent: false,
            log_frames: false,
            log_scancodes: false,
            log_ptyio: false,
            daemon: false,
            login_mode: false,
            admin: crate::config::AdminEndpoint::None,
            terminfo_dir: None,
        };
        let mut scheduler = Scheduler::new(config).expect("open pty master as link");

        assert_eq!(scheduler.slots.len(), 1);
        assert_eq!(scheduler.slots[0].engine.state(), StationState::Unattached);

        scheduler.attach("4:typewriter:slow".parse().unwrap());
        assert_eq!(scheduler.slots.len(), 2);
        assert_eq!(scheduler.slots[1].spec.cadence, PollCadence::Slow);

        scheduler.detach(4);
        assert_eq!(scheduler.slots[1].engine.state(), StationState::Draining);

        scheduler.restart(4);
        assert_eq!(scheduler.slots[1].engine.state(), StationState::Unattached);
        assert_eq!(scheduler.slots[1].engine.cadence(), PollCadence::Slow);
    }
}
