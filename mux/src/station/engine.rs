// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! The per-station protocol state machine.
//!
//! An engine never blocks and never touches an fd. The scheduler calls
//! [`StationEngine::tick`] each time the station gets a turn; the engine
//! answers with at most one transmission. Inbound traffic attributed to the
//! station comes back through [`StationEngine::handle_word`] /
//! [`StationEngine::handle_transmit_complete`] /
//! [`StationEngine::handle_timeout`], and anything the rest of the system
//! must react to (a keystroke, a lost terminal, readiness for a session)
//! comes back as [`EngineEvent`]s for the scheduler to act on.
//!
//! One request is outstanding per station at any moment, and a write burst
//! is a single transmission, so polls can never interleave with it.

use std::time::{Duration, Instant};

use smallvec::SmallVec;

use super::{
    PollCadence,
    frame::{self, Command, Response, StatusIndicators},
};

/// Consecutive poll misses before the terminal is declared gone.
pub const MISS_THRESHOLD: u8 = 8;

/// Consecutive inbound parity errors before the station is reset.
pub const PARITY_THRESHOLD: u8 = 4;

/// Retries for a command that drew a NAK or an unexpected response.
pub const RETRY_LIMIT: u8 = 3;

/// A poll's deadline is `poll_interval * POLL_DEADLINE_FACTOR` after it is
/// sent.
pub const POLL_DEADLINE_FACTOR: u32 = 8;

/// Approximate wire time per word at 57600 baud, used to budget burst
/// deadlines.
const WORD_WIRE_TIME: Duration = Duration::from_micros(400);

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum StationState {
    /// No terminal observed; polling at normal cadence.
    Unattached,
    /// Terminal answered; running the bring-up exchange.
    Initializing,
    /// Steady state: polling, relaying keystrokes, queueing writes.
    Ready,
    /// A screen-update burst is on the wire.
    Writing,
    /// Saying goodbye: final clear before returning to `Unattached`.
    Draining,
}

/// What the transmission just issued expects back from the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    /// A classified response word.
    Response,
    /// An `[EOTX]` transmission-complete marker.
    TransmitComplete,
}

/// One transmission for the scheduler to put on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxAction {
    pub words: SmallVec<[u16; 8]>,
    pub expects: Expect,
}

/// Things the scheduler must act on after feeding the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    /// Initialization finished; time to spawn the session shell.
    BecameReady,
    /// The terminal vanished or failed hard; tear the session down.
    SessionLost,
    /// A keystroke for the session's scancode decoder.
    Scancode(u8),
    /// Indicator bits for the session's status line.
    Status(StatusIndicators),
}

/// The bring-up exchange, in order. Each step is one command word and one
/// expected response.
const INIT_SEQUENCE: [Command; 4] = [
    Command::Reset,
    Command::QueryKeyboardId,
    Command::EnableKeyboard,
    Command::ClearScreen,
];

#[derive(Debug)]
struct Outstanding {
    expects: Expect,
    deadline: Instant,
}

#[derive(Debug)]
pub struct StationEngine {
    addr: u8,
    state: StationState,
    cadence: PollCadence,
    last_poll: Option<Instant>,
    outstanding: Option<Outstanding>,
    /// Last command transmission, kept for NAK retry.
    last_tx: SmallVec<[u16; 8]>,
    resend_pending: bool,
    init_step: usize,
    init_sent: bool,
    drain_sent: bool,
    retries: u8,
    miss_count: u8,
    parity_errors: u8,
    keyboard_id: Option<u8>,
    queued_burst: Option<SmallVec<[u16; 8]>>,
    queued_commands: SmallVec<[Command; 2]>,
}

impl StationEngine {
    #[must_use]
    pub fn new(addr: u8, cadence: PollCadence) -> Self {
        debug_assert!(addr <= frame::MAX_STATION_ADDR);
        Self {
            addr,
            state: StationState::Unattached,
            cadence,
            last_poll: None,
            outstanding: None,
            last_tx: SmallVec::new(),
            resend_pending: false,
            init_step: 0,
            init_sent: false,
            drain_sent: false,
            retries: 0,
            miss_count: 0,
            parity_errors: 0,
            keyboard_id: None,
            queued_burst: None,
            queued_commands: SmallVec::new(),
        }
    }

    #[must_use]
    pub fn addr(&self) -> u8 { self.addr }

    #[must_use]
    pub fn state(&self) -> StationState { self.state }

    #[must_use]
    pub fn cadence(&self) -> PollCadence { self.cadence }

    #[must_use]
    pub fn keyboard_id(&self) -> Option<u8> { self.keyboard_id }

    /// Whether the engine can accept a display burst right now.
    #[must_use]
    pub fn ready_for_write(&self) -> bool {
        self.state == StationState::Ready && self.queued_burst.is_none()
    }

    /// Queue an encoded display-update burst. Only legal in `Ready`.
    pub fn enqueue_burst(&mut self, words: SmallVec<[u16; 8]>) {
        debug_assert!(self.ready_for_write());
        self.queued_burst = Some(words);
    }

    /// Queue a standalone command (indicator updates and the like).
    pub fn enqueue_command(&mut self, cmd: Command) {
        self.queued_commands.push(cmd);
    }

    /// Full protocol reset, used on (re)attach.
    pub fn reset(&mut self, cadence: PollCadence) {
        *self = StationEngine::new(self.addr, cadence);
    }

    /// Start the goodbye sequence.
    pub fn begin_drain(&mut self) {
        self.state = StationState::Draining;
        self.queued_burst = None;
        self.queued_commands.clear();
        self.outstanding = None;
        self.resend_pending = false;
        self.drain_sent = false;
    }

    /// One scheduling turn: produce at most one transmission.
    pub fn tick(&mut self, now: Instant) -> Option<TxAction> {
        if self.outstanding.is_some() {
            return None;
        }

        if self.resend_pending {
            self.resend_pending = false;
            let words = self.last_tx.clone();
            return Some(self.transmit(words, Expect::Response, now));
        }

        match self.state {
            StationState::Unattached => self.tick_poll(PollCadence::Normal, now),
            StationState::Initializing => {
                if self.init_sent {
                    return None;
                }
                self.init_sent = true;
                let cmd = INIT_SEQUENCE[self.init_step];
                let words = SmallVec::from_slice(&[frame::command_word(self.addr, cmd)]);
                Some(self.transmit(words, Expect::Response, now))
            }
            StationState::Ready => {
                if let Some(burst) = self.queued_burst.take() {
                    self.state = StationState::Writing;
                    return Some(self.transmit(burst, Expect::TransmitComplete, now));
                }
                if let Some(cmd) = self.queued_commands.first().copied() {
                    self.queued_commands.remove(0);
                    let words =
                        SmallVec::from_slice(&[frame::command_word(self.addr, cmd)]);
                    return Some(self.transmit(words, Expect::Response, now));
                }
                self.tick_poll(self.cadence, now)
            }
            StationState::Writing => None,
            StationState::Draining => {
                if self.drain_sent {
                    return None;
                }
                self.drain_sent = true;
                let words = SmallVec::from_slice(&[frame::command_word(
                    self.addr,
                    Command::ClearScreen,
                )]);
                Some(self.transmit(words, Expect::Response, now))
            }
        }
    }

    /// Route one inbound response word to the state machine. Parity is
    /// verified here; the returned events are for the scheduler to act on
    /// in the same tick.
    pub fn handle_word(&mut self, word: u16, now: Instant) -> SmallVec<[EngineEvent; 2]> {
        let mut events = SmallVec::new();

        if self.outstanding.as_ref().map(|o| o.expects) != Some(Expect::Response) {
            tracing::debug!(
                target: "twinax_mux::frame",
                addr = self.addr,
                word,
                state = %self.state,
                "response with nothing outstanding"
            );
            return events;
        }

        if !frame::response_parity_ok(word) {
            self.parity_errors += 1;
            tracing::warn!(
                target: "twinax_mux::frame",
                addr = self.addr,
                word,
                consecutive = self.parity_errors,
                "inbound parity error"
            );
            self.outstanding = None;
            if self.parity_errors > PARITY_THRESHOLD {
                self.fail(&mut events);
            }
            return events;
        }
        self.parity_errors = 0;
        self.outstanding = None;
        self.miss_count = 0;

        let response = frame::classify_response(word);
        match self.state {
            StationState::Unattached => {
                // Someone is alive out there.
                tracing::info!(addr = self.addr, "terminal detected, initializing");
                self.state = StationState::Initializing;
                self.init_step = 0;
                self.init_sent = false;
                self.retries = 0;
            }
            StationState::Initializing => self.handle_init_response(response, &mut events),
            StationState::Ready => match response {
                // Retries are per-command: any successful exchange clears
                // the count, so only consecutive NAKs can exhaust it.
                Response::Null => self.retries = 0,
                Response::Scancode(sc) => {
                    self.retries = 0;
                    events.push(EngineEvent::Scancode(sc));
                }
                Response::Status(flags) => {
                    self.retries = 0;
                    events.push(EngineEvent::Status(flags));
                }
                Response::Nak => self.retry_or_fail(&mut events),
            },
            StationState::Writing => {
                // Bursts complete via EOTX, not via a response word.
                tracing::debug!(addr = self.addr, word, "response during write burst");
            }
            StationState::Draining => {
                self.state = StationState::Unattached;
                self.last_poll = Some(now);
            }
        }
        events
    }

    /// `[EOTX]` arrived for this station's transmission.
    pub fn handle_transmit_complete(&mut self) {
        match self.outstanding.as_ref().map(|o| o.expects) {
            Some(Expect::TransmitComplete) => {
                self.outstanding = None;
                if self.state == StationState::Writing {
                    self.state = StationState::Ready;
                }
            }
            _ => {
                tracing::debug!(
                    target: "twinax_mux::frame",
                    addr = self.addr,
                    "unexpected transmission-complete marker"
                );
            }
        }
    }

    /// The scheduler resolved this station's outstanding request as expired.
    pub fn handle_timeout(&mut self, _now: Instant) -> SmallVec<[EngineEvent; 2]> {
        let mut events = SmallVec::new();
        let Some(outstanding) = self.outstanding.take() else {
            return events;
        };

        match self.state {
            StationState::Unattached => {
                // Nobody home, keep polling quietly.
            }
            StationState::Writing => {
                // A burst that never completed is as bad as a chain of
                // misses; the terminal state is unknown now.
                tracing::warn!(addr = self.addr, "write burst never completed");
                self.fail(&mut events);
            }
            StationState::Draining => {
                // The goodbye went unanswered; the terminal is gone anyway.
                self.state = StationState::Unattached;
            }
            _ => {
                self.miss_count += 1;
                tracing::debug!(
                    addr = self.addr,
                    misses = self.miss_count,
                    expects = ?outstanding.expects,
                    "poll timeout"
                );
                if self.miss_count >= MISS_THRESHOLD {
                    tracing::info!(addr = self.addr, "terminal removed (poll misses)");
                    self.fail(&mut events);
                } else if self.state == StationState::Initializing {
                    // Re-issue the unanswered bring-up step next turn.
                    self.init_sent = false;
                }
            }
        }
        events
    }

    /// Deadline of the current outstanding request, for the scheduler's
    /// timer bookkeeping.
    #[must_use]
    pub fn outstanding_deadline(&self) -> Option<Instant> {
        self.outstanding.as_ref().map(|o| o.deadline)
    }

    fn tick_poll(&mut self, cadence: PollCadence, now: Instant) -> Option<TxAction> {
        let due = match self.last_poll {
            None => true,
            Some(at) => now.duration_since(at) >= cadence.interval(),
        };
        if !due {
            return None;
        }
        self.last_poll = Some(now);
        let words = SmallVec::from_slice(&[frame::command_word(self.addr, Command::Poll)]);
        Some(self.transmit(words, Expect::Response, now))
    }

    fn transmit(
        &mut self,
        words: SmallVec<[u16; 8]>,
        expects: Expect,
        now: Instant,
    ) -> TxAction {
        let deadline = now
            + self.cadence.interval() * POLL_DEADLINE_FACTOR
            + WORD_WIRE_TIME * words.len() as u32;
        self.outstanding = Some(Outstanding { expects, deadline });
        if expects == Expect::Response {
            self.last_tx = words.clone();
        }
        TxAction { words, expects }
    }

    fn handle_init_response(
        &mut self,
        response: Response,
        events: &mut SmallVec<[EngineEvent; 2]>,
    ) {
        let step_ok = match (INIT_SEQUENCE[self.init_step], response) {
            (Command::QueryKeyboardId, Response::Scancode(id)) => {
                self.keyboard_id = Some(id);
                true
            }
            (_, Response::Status(flags)) => flags.contains(StatusIndicators::ACK),
            _ => false,
        };

        if step_ok {
            self.retries = 0;
            self.init_step += 1;
            self.init_sent = false;
            if self.init_step == INIT_SEQUENCE.len() {
                tracing::info!(
                    addr = self.addr,
                    keyboard_id = self.keyboard_id,
                    "station initialized"
                );
                self.state = StationState::Ready;
                events.push(EngineEvent::BecameReady);
            }
        } else {
            tracing::debug!(
                addr = self.addr,
                step = ?INIT_SEQUENCE[self.init_step],
                ?response,
                "unexpected init response"
            );
            self.retry_or_fail(events);
        }
    }

    /// Retry the current exchange, giving up after [`RETRY_LIMIT`] attempts.
    fn retry_or_fail(&mut self, events: &mut SmallVec<[EngineEvent; 2]>) {
        self.retries += 1;
        if self.retries > RETRY_LIMIT {
            tracing::warn!(addr = self.addr, "retry limit exhausted");
            self.fail(events);
        } else if self.state == StationState::Initializing {
            self.init_sent = false;
        } else {
            self.resend_pending = true;
        }
    }

    /// Drop back to `Unattached`, telling the scheduler to reap the session
    /// if one was running.
    fn fail(&mut self, events: &mut SmallVec<[EngineEvent; 2]>) {
        let had_session =
            matches!(self.state, StationState::Ready | StationState::Writing);
        self.state = StationState::Unattached;
        self.outstanding = None;
        self.queued_burst = None;
        self.queued_commands.clear();
        self.resend_pending = false;
        self.retries = 0;
        self.miss_count = 0;
        self.parity_errors = 0;
        if had_session {
            events.push(EngineEvent::SessionLost);
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::station::frame::{
        RESPONSE_CLASS_NAK, RESPONSE_CLASS_NULL, RESPONSE_CLASS_SCANCODE,
        RESPONSE_CLASS_STATUS, make_response,
    };

    const ACK: u8 = 0x08;

    fn now() -> Instant { Instant::now() }

    fn engine() -> StationEngine { StationEngine::new(0, PollCadence::Normal) }

    /// Drive the bring-up exchange to completion; returns the events from
    /// the final step.
    fn bring_up(engine: &mut StationEngine, t: Instant) -> Vec<EngineEvent> {
        // First poll discovers the terminal.
        let poll = engine.tick(t).expect("first poll");
        assert_eq!(poll.expects, Expect::Response);
        let _ = engine.handle_word(make_response(RESPONSE_CLASS_NULL, 0), t);
        assert_eq!(engine.state(), StationState::Initializing);

        let mut last_events = Vec::new();
        let replies = [
            make_response(RESPONSE_CLASS_STATUS, ACK), // Reset
            make_response(RESPONSE_CLASS_SCANCODE, 0x42), // keyboard id
            make_response(RESPONSE_CLASS_STATUS, ACK), // EnableKeyboard
            make_response(RESPONSE_CLASS_STATUS, ACK), // ClearScreen
        ];
        for reply in replies {
            let tx = engine.tick(t).expect("init step");
            assert_eq!(tx.words.len(), 1);
            last_events = engine.handle_word(reply, t).to_vec();
        }
        last_events
    }

    #[test]
    fn cold_attach_reaches_ready_within_six_round_trips() {
        let mut engine = engine();
        let t = now();
        let events = bring_up(&mut engine, t);
        assert_eq!(engine.state(), StationState::Ready);
        assert_eq!(events, vec![EngineEvent::BecameReady]);
        assert_eq!(engine.keyboard_id(), Some(0x42));
    }

    #[test]
    fn scancode_response_becomes_an_event() {
        let mut engine = engine();
        let t = now();
        bring_up(&mut engine, t);

        let t = t + PollCadence::Normal.interval();
        let _poll = engine.tick(t).expect("steady-state poll");
        let events = engine.handle_word(make_response(RESPONSE_CLASS_SCANCODE, 0x23), t);
        assert_eq!(events.to_vec(), vec![EngineEvent::Scancode(0x23)]);
    }

    #[test]
    fn polls_respect_the_configured_cadence() {
        let mut engine = StationEngine::new(1, PollCadence::Slow);
        let t = now();
        bring_up(&mut engine, t);

        // Immediately after the last exchange nothing is due.
        assert!(engine.tick(t).is_none());
        // Under the slow interval: still nothing.
        let early = t + PollCadence::Slow.interval() / 2;
        assert!(engine.tick(early).is_none());
        // At the interval the poll goes out.
        let due = t + PollCadence::Slow.interval();
        assert!(engine.tick(due).is_some());
    }

    #[test]
    fn one_outstanding_request_per_station() {
        let mut engine = engine();
        let t = now();
        assert!(engine.tick(t).is_some());
        // Same instant, next turn: the poll is outstanding, nothing new.
        assert!(engine.tick(t).is_none());
        assert!(engine.tick(t + Duration::from_secs(1)).is_none());
    }

    #[test]
    fn write_burst_defers_polls_until_transmit_complete() {
        let mut engine = engine();
        let t = now();
        bring_up(&mut engine, t);

        assert!(engine.ready_for_write());
        engine.enqueue_burst(SmallVec::from_slice(&[0x0100, 0x0200]));
        let t = t + PollCadence::Normal.interval();
        let tx = engine.tick(t).expect("burst transmission");
        assert_eq!(tx.expects, Expect::TransmitComplete);
        assert_eq!(engine.state(), StationState::Writing);

        // Long after the poll interval, still no poll: the burst is open.
        let later = t + PollCadence::Normal.interval() * 4;
        assert!(engine.tick(later).is_none());

        engine.handle_transmit_complete();
        assert_eq!(engine.state(), StationState::Ready);
        assert!(engine.tick(later).is_some());
    }

    #[test]
    fn nak_retries_then_gives_up() {
        let mut engine = engine();
        let mut t = now();
        bring_up(&mut engine, t);

        let mut lost = false;
        for attempt in 0..=RETRY_LIMIT {
            t += PollCadence::Normal.interval();
            let tx = engine.tick(t).unwrap_or_else(|| {
                panic!("attempt {attempt}: expected a (re)transmission")
            });
            assert_eq!(tx.expects, Expect::Response);
            let events = engine.handle_word(make_response(RESPONSE_CLASS_NAK, 0), t);
            lost = events.contains(&EngineEvent::SessionLost);
        }
        assert!(lost, "fourth NAK must drop the station");
        assert_eq!(engine.state(), StationState::Unattached);
    }

    #[test]
    fn non_consecutive_naks_do_not_accumulate() {
        let mut engine = engine();
        let mut t = now();
        bring_up(&mut engine, t);

        // Many NAK-then-recover rounds: each NAK is answered by a clean
        // response on the retry, which must clear the count every time.
        for round in 0..(RETRY_LIMIT * 4) {
            t += PollCadence::Normal.interval();
            assert!(engine.tick(t).is_some(), "round {round}: poll");
            let events = engine.handle_word(make_response(RESPONSE_CLASS_NAK, 0), t);
            assert!(events.is_empty(), "round {round}: single NAK must not drop");

            t += PollCadence::Normal.interval();
            assert!(engine.tick(t).is_some(), "round {round}: resend");
            let _ = engine.handle_word(make_response(RESPONSE_CLASS_NULL, 0), t);
            assert_eq!(engine.state(), StationState::Ready, "round {round}");
        }
    }

    #[test]
    fn miss_threshold_drops_the_station() {
        let mut engine = engine();
        let mut t = now();
        bring_up(&mut engine, t);

        let mut lost = false;
        for _ in 0..MISS_THRESHOLD {
            t += PollCadence::Normal.interval();
            assert!(engine.tick(t).is_some());
            let events = engine.handle_timeout(t);
            lost = events.contains(&EngineEvent::SessionLost);
        }
        assert!(lost);
        assert_eq!(engine.state(), StationState::Unattached);

        // Back in Unattached the engine polls at normal cadence again.
        t += PollCadence::Normal.interval();
        assert!(engine.tick(t).is_some());
    }

    #[test]
    fn parity_errors_reset_the_station_only_when_consecutive() {
        let mut engine = engine();
        let mut t = now();
        bring_up(&mut engine, t);

        // A corrupt word: flip one bit in a valid response.
        let corrupt = make_response(RESPONSE_CLASS_NULL, 0x01) ^ 0x0020;

        for _ in 0..PARITY_THRESHOLD {
            t += PollCadence::Normal.interval();
            assert!(engine.tick(t).is_some());
            let events = engine.handle_word(corrupt, t);
            assert!(events.is_empty());
            assert_eq!(engine.state(), StationState::Ready);
        }
        // A clean response resets the consecutive counter.
        t += PollCadence::Normal.interval();
        assert!(engine.tick(t).is_some());
        let _ = engine.handle_word(make_response(RESPONSE_CLASS_NULL, 0), t);

        for i in 0..=PARITY_THRESHOLD {
            t += PollCadence::Normal.interval();
            assert!(engine.tick(t).is_some(), "round {i}");
            let events = engine.handle_word(corrupt, t);
            if i == PARITY_THRESHOLD {
                assert!(events.contains(&EngineEvent::SessionLost));
            }
        }
        assert_eq!(engine.state(), StationState::Unattached);
    }

    #[test]
    fn unattached_station_ignores_timeouts_quietly() {
        let mut engine = engine();
        let mut t = now();
        for _ in 0..(MISS_THRESHOLD * 2) {
            t += PollCadence::Normal.interval();
            assert!(engine.tick(t).is_some());
            assert!(engine.handle_timeout(t).is_empty());
        }
        assert_eq!(engine.state(), StationState::Unattached);
    }

    #[test]
    fn drain_sends_a_final_clear_then_unattaches() {
        let mut engine = engine();
        let t = now();
        bring_up(&mut engine, t);

        engine.begin_drain();
        assert_eq!(engine.state(), StationState::Draining);
        let tx = engine.tick(t).expect("final clear");
        assert_eq!(
            tx.words.as_slice(),
            &[frame::command_word(0, Command::ClearScreen)]
        );
        let _ = engine.handle_word(make_response(RESPONSE_CLASS_STATUS, ACK), t);
        assert_eq!(engine.state(), StationState::Unattached);
    }

    #[test]
    fn init_failure_falls_back_to_unattached_after_retries() {
        let mut engine = engine();
        let t = now();
        let _ = engine.tick(t).expect("poll");
        let _ = engine.handle_word(make_response(RESPONSE_CLASS_NULL, 0), t);
        assert_eq!(engine.state(), StationState::Initializing);

        // Reset keeps drawing NAKs.
        for _ in 0..=RETRY_LIMIT {
            let _ = engine.tick(t).expect("init (re)send");
            let _ = engine.handle_word(make_response(RESPONSE_CLASS_NAK, 0), t);
        }
        assert_eq!(engine.state(), StationState::Unattached);
    }
}
