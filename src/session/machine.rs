//! The interview session controller.
//!
//! Owns the call lifecycle and the turn state, and wires the connection,
//! capture, playback and transcript together. Every transition runs inside
//! [`SessionStateMachine::handle`] to completion; nothing here awaits.
//!
//! Capture is gated by one rule, re-evaluated after every event: listen only
//! while the call is active, the microphone is unmuted, the connection is up
//! and the peer is not speaking.

use crate::config::Config;
use crate::connection::{
    ClientMessage, ConnectionEvent, ConnectionManager, ConnectionState, Connector, PeerMessage,
};
use crate::defaults;
use crate::event::{EventSender, SessionCommand, SessionEvent};
use crate::session::state::{
    SessionSnapshot, SessionStatus, StatusBanner, TurnState, format_elapsed,
};
use crate::speech::{
    CaptureBackend, InputOutcome, PlaybackBackend, PlaybackOutcome, SpeechInputController,
    SpeechOutputController, Voice,
};
use crate::timer::ScheduledTask;
use crate::transcript::{Speaker, TranscriptLog};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub struct SessionStateMachine {
    status: SessionStatus,
    turn: TurnState,
    /// When the current call started. `None` outside a call.
    started_at: Option<Instant>,
    elapsed_seconds: u64,
    muted: bool,
    transcript: TranscriptLog,
    /// Chunks of the reply streaming in. `Some` between start and end.
    pending_reply: Option<String>,
    banner: Option<StatusBanner>,
    connection: ConnectionManager,
    input: SpeechInputController,
    output: SpeechOutputController,
    events: EventSender,
    tick_interval: Duration,
    ticker: Option<ScheduledTask>,
    epoch: u64,
}

impl SessionStateMachine {
    pub fn new(
        config: &Config,
        connector: Arc<dyn Connector>,
        capture: Box<dyn CaptureBackend>,
        playback: Box<dyn PlaybackBackend>,
        events: EventSender,
    ) -> Self {
        Self {
            status: SessionStatus::Idle,
            turn: TurnState::Idle,
            started_at: None,
            elapsed_seconds: 0,
            muted: false,
            transcript: TranscriptLog::new(),
            pending_reply: None,
            banner: None,
            connection: ConnectionManager::new(
                config.server.url.clone(),
                config.server.reconnect_delay(),
                connector,
                events.clone(),
            ),
            input: SpeechInputController::new(
                capture,
                events.clone(),
                config.capture.restart_delay(),
            ),
            output: SpeechOutputController::new(
                playback,
                events.clone(),
                Voice::from(&config.playback),
            ),
            events,
            tick_interval: Duration::from_millis(defaults::TICK_INTERVAL_MS),
            ticker: None,
            epoch: 0,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn turn(&self) -> TurnState {
        self.turn
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.elapsed_seconds
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    pub fn transcript(&self) -> &TranscriptLog {
        &self.transcript
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn banner(&self) -> Option<&StatusBanner> {
        self.banner.as_ref()
    }

    /// Whether capture is live.
    pub fn is_listening(&self) -> bool {
        self.input.is_capturing()
    }

    /// Whether any timer owned by the session is still armed.
    pub fn has_pending_timers(&self) -> bool {
        self.ticker.is_some() || self.connection.reconnect_pending() || self.input.restart_pending()
    }

    /// The gating rule for capture.
    pub fn listening_allowed(&self) -> bool {
        self.status == SessionStatus::Active
            && !self.muted
            && self.connection.is_connected()
            && self.turn != TurnState::PeerSpeaking
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            status: self.status,
            started_at: self.started_at,
            elapsed_seconds: self.elapsed_seconds,
            turn: self.turn,
            muted: self.muted,
            connection: self.connection.state(),
            listening: self.input.is_capturing(),
            speaking: self.output.is_playing(),
            transcript: self.transcript.read_all().to_vec(),
            pending_reply: self.pending_reply.clone(),
            banner: self.banner.clone(),
            capture_error: self.input.fatal_error().map(str::to_string),
        }
    }

    /// Apply one event to completion.
    pub fn handle(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Command(command) => self.on_command(command),
            SessionEvent::Connection(signal) => {
                if let Some(event) = self.connection.handle(signal) {
                    self.on_connection(event);
                }
            }
            SessionEvent::Capture { ticket, event } => {
                let outcome = self.input.handle(ticket, event);
                self.on_input(outcome);
            }
            SessionEvent::CaptureRestartDue { ticket } => {
                if let Some(outcome) = self.input.restart_due(ticket) {
                    self.on_input(outcome);
                }
            }
            SessionEvent::Playback { utterance, event } => {
                let outcome = self.output.handle(utterance, event);
                self.on_playback(outcome);
            }
            SessionEvent::Tick { epoch } => self.on_tick(epoch),
        }
        self.sync_listening();
    }

    fn on_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Start => self.start(),
            SessionCommand::End | SessionCommand::Shutdown => self.end(),
            SessionCommand::SetMuted(muted) => self.set_muted(muted),
            SessionCommand::ToggleMute => self.set_muted(!self.muted),
            SessionCommand::ClearError => {
                self.banner = None;
                if let Some(outcome) = self.input.clear_fatal() {
                    self.on_input(outcome);
                }
            }
            SessionCommand::ClearTranscript => {
                debug!(entries = self.transcript.len(), "transcript cleared");
                self.transcript.clear();
            }
        }
    }

    fn start(&mut self) {
        if self.status == SessionStatus::Active {
            debug!("start ignored, call already active");
            return;
        }
        info!("interview started");

        self.status = SessionStatus::Active;
        self.started_at = Some(Instant::now());
        self.elapsed_seconds = 0;
        self.turn = TurnState::Idle;
        self.muted = false;
        self.transcript.clear();
        self.pending_reply = None;
        self.banner = None;
        self.input.reset();
        self.output.cancel();

        self.epoch += 1;
        let epoch = self.epoch;
        self.ticker = Some(ScheduledTask::every(
            self.tick_interval,
            self.events.clone(),
            move || SessionEvent::Tick { epoch },
        ));

        self.connection.connect();
    }

    fn end(&mut self) {
        if self.status == SessionStatus::Active {
            info!(
                duration = %format_elapsed(self.elapsed_seconds),
                entries = self.transcript.len(),
                "interview ended"
            );
        }
        self.status = SessionStatus::Ended;
        self.started_at = None;

        if let Some(ticker) = self.ticker.take() {
            ticker.cancel();
        }
        self.epoch += 1;
        self.connection.disconnect();
        self.input.reset();
        self.output.cancel();

        self.turn = TurnState::Idle;
        self.pending_reply = None;
        self.banner = None;
        self.elapsed_seconds = 0;
    }

    fn set_muted(&mut self, muted: bool) {
        if self.muted == muted {
            return;
        }
        self.muted = muted;
        info!(muted, "microphone mute changed");
    }

    fn on_tick(&mut self, epoch: u64) {
        if epoch != self.epoch || self.status != SessionStatus::Active {
            debug!(epoch, current = self.epoch, "dropping stale tick");
            return;
        }
        self.elapsed_seconds += 1;
    }

    fn on_connection(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Connected => {
                if self.banner.as_ref().is_some_and(StatusBanner::is_connection_status) {
                    self.banner = None;
                }
            }
            ConnectionEvent::Errored(reason) => {
                debug!(%reason, "connection errored");
                self.banner = Some(StatusBanner::connection(defaults::CONNECTION_ERROR_MESSAGE));
            }
            ConnectionEvent::Closed => {
                if self.status == SessionStatus::Active {
                    self.banner = Some(StatusBanner::reconnecting(defaults::RECONNECTING_MESSAGE));
                }
                self.abandon_reply();
            }
            ConnectionEvent::MessageReceived(payload) => self.on_peer_payload(&payload),
        }
    }

    /// Drop a reply that can no longer complete. One already playing keeps
    /// playing.
    fn abandon_reply(&mut self) {
        if self.pending_reply.take().is_some() {
            debug!("abandoning streamed reply");
        }
        let stuck = match self.turn {
            TurnState::AwaitingReply => true,
            TurnState::PeerSpeaking => !self.output.is_playing(),
            TurnState::Idle | TurnState::Listening => false,
        };
        if stuck {
            self.set_turn(TurnState::Idle);
        }
    }

    fn on_peer_payload(&mut self, payload: &str) {
        let message = match PeerMessage::from_json(payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, %payload, "ignoring malformed peer message");
                return;
            }
        };

        match message {
            PeerMessage::Connected { message } => info!(%message, "peer greeting"),
            PeerMessage::Processing { message } => debug!(%message, "peer processing"),
            PeerMessage::Info { message } => info!(%message, "peer notice"),
            PeerMessage::AiResponseStart => {
                if self.turn == TurnState::PeerSpeaking {
                    debug!("new reply supersedes the current one");
                    self.output.cancel();
                }
                self.pending_reply = Some(String::new());
                self.set_turn(TurnState::PeerSpeaking);
                // Capture must be off before any chunk arrives.
                self.sync_listening();
            }
            PeerMessage::AiResponseChunk { text } => {
                match self.pending_reply.as_mut() {
                    Some(reply) if self.turn == TurnState::PeerSpeaking => reply.push_str(&text),
                    _ => debug!(turn = ?self.turn, "dropping chunk for no in-flight reply"),
                }
            }
            PeerMessage::AiResponseEnd { full_text } => self.finish_reply(full_text),
            PeerMessage::Error { message } => {
                let message = if message.trim().is_empty() {
                    defaults::SERVER_ERROR_MESSAGE.to_string()
                } else {
                    message
                };
                warn!(%message, "peer reported an error");
                self.banner = Some(StatusBanner::error(message));
                self.pending_reply = None;
                self.output.cancel();
                if matches!(self.turn, TurnState::AwaitingReply | TurnState::PeerSpeaking) {
                    self.set_turn(TurnState::Idle);
                }
            }
        }
    }

    fn finish_reply(&mut self, full_text: String) {
        let chunks = match self.pending_reply.take() {
            Some(chunks) if self.turn == TurnState::PeerSpeaking => chunks,
            _ => {
                debug!(turn = ?self.turn, "dropping reply end for no in-flight reply");
                return;
            }
        };

        let text = if full_text.trim().is_empty() {
            chunks
        } else {
            full_text
        };
        let text = text.trim();
        if text.is_empty() {
            debug!("empty reply, nothing to speak");
            self.set_turn(TurnState::Idle);
            return;
        }

        self.transcript.append(Speaker::Peer, text);
        if let Err(e) = self.output.speak(text) {
            warn!(error = %e, "cannot speak reply");
            self.banner = Some(StatusBanner::error(e.to_string()));
            self.set_turn(TurnState::Idle);
        }
    }

    fn on_input(&mut self, outcome: InputOutcome) {
        match outcome {
            InputOutcome::Started => {
                if self.turn == TurnState::Idle {
                    self.set_turn(TurnState::Listening);
                }
            }
            InputOutcome::Utterance(text) => self.on_utterance(text),
            InputOutcome::Stopped => {
                if self.turn == TurnState::Listening {
                    self.set_turn(TurnState::Idle);
                }
            }
            InputOutcome::Denied(reason) => {
                self.banner = Some(StatusBanner::error(format!(
                    "Speech capture stopped: {}",
                    reason
                )));
                if self.turn == TurnState::Listening {
                    self.set_turn(TurnState::Idle);
                }
            }
            InputOutcome::Ignored => {}
        }
    }

    fn on_utterance(&mut self, text: String) {
        if self.turn != TurnState::Listening {
            info!(turn = ?self.turn, "discarding utterance outside the listening turn");
            return;
        }

        self.transcript.append(Speaker::User, text.as_str());
        match self.connection.send(&ClientMessage::Transcript { text }) {
            Ok(()) => self.set_turn(TurnState::AwaitingReply),
            Err(e) => {
                warn!(error = %e, "failed to send utterance");
                self.banner = Some(StatusBanner::error(defaults::SEND_FAILED_MESSAGE));
            }
        }
    }

    fn on_playback(&mut self, outcome: PlaybackOutcome) {
        match outcome {
            PlaybackOutcome::Started | PlaybackOutcome::Ignored => {}
            PlaybackOutcome::Finished | PlaybackOutcome::Failed(_) => {
                if self.turn == TurnState::PeerSpeaking && self.pending_reply.is_none() {
                    self.set_turn(TurnState::Idle);
                }
            }
        }
    }

    /// Recompute the gating rule and start or stop capture to match.
    fn sync_listening(&mut self) {
        let was_capturing = self.input.is_capturing();
        let allowed = self.listening_allowed();
        if let Some(outcome) = self.input.set_should_listen(allowed) {
            self.on_input(outcome);
        }
        let capturing = self.input.is_capturing();
        if !capturing && self.turn == TurnState::Listening {
            self.set_turn(TurnState::Idle);
        } else if was_capturing && capturing && self.turn == TurnState::Idle {
            // Capture outlived the turn that just ended; a fresh run waits
            // for its Started instead.
            self.set_turn(TurnState::Listening);
        }
    }

    fn set_turn(&mut self, turn: TurnState) {
        if self.turn != turn {
            debug!(from = ?self.turn, to = ?turn, "turn changed");
            self.turn = turn;
        }
    }
}
