//! Continuous speech capture gated by a single listen intent.
//!
//! The controller tells three kinds of stop apart: stopped because it was
//! told to (`set_should_listen(false)`), ended on its own while it should
//! keep listening (restart after a short delay), and denied (never retried
//! until the error is cleared).

use crate::error::ParleyError;
use crate::event::{EventSender, SessionEvent};
use crate::speech::capture::{CaptureBackend, CaptureEvent, CaptureEvents};
use crate::timer::ScheduledTask;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// What a capture event means to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum InputOutcome {
    /// Capture is live.
    Started,
    /// A finalized, non-blank utterance.
    Utterance(String),
    /// The capture run ended.
    Stopped,
    /// Capture failed for good; the reason stays until cleared.
    Denied(String),
    /// Nothing for the session to do.
    Ignored,
}

pub struct SpeechInputController {
    backend: Box<dyn CaptureBackend>,
    events: EventSender,
    restart_delay: Duration,
    should_listen: bool,
    capturing: bool,
    ticket: u64,
    restart: Option<ScheduledTask>,
    fatal: Option<String>,
}

impl SpeechInputController {
    pub fn new(
        backend: Box<dyn CaptureBackend>,
        events: EventSender,
        restart_delay: Duration,
    ) -> Self {
        Self {
            backend,
            events,
            restart_delay,
            should_listen: false,
            capturing: false,
            ticket: 0,
            restart: None,
            fatal: None,
        }
    }

    /// Whether a capture run is live.
    pub fn is_capturing(&self) -> bool {
        self.capturing
    }

    pub fn should_listen(&self) -> bool {
        self.should_listen
    }

    /// Persistent capture error, if any.
    pub fn fatal_error(&self) -> Option<&str> {
        self.fatal.as_deref()
    }

    /// True while a restart is scheduled.
    pub fn restart_pending(&self) -> bool {
        self.restart.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Apply the listen intent. Only a change of intent starts or stops
    /// capture.
    ///
    /// Returns `Denied` when starting hit a fatal error.
    pub fn set_should_listen(&mut self, flag: bool) -> Option<InputOutcome> {
        if flag == self.should_listen {
            return None;
        }
        self.should_listen = flag;
        debug!(should_listen = flag, "listen intent changed");
        if flag {
            self.begin()
        } else {
            self.halt();
            None
        }
    }

    /// Forget a persistent error and resume capture if listening is wanted.
    pub fn clear_fatal(&mut self) -> Option<InputOutcome> {
        if self.fatal.take().is_none() {
            return None;
        }
        info!("capture error cleared");
        if self.should_listen {
            self.begin()
        } else {
            None
        }
    }

    /// Stop everything and forget the persistent error.
    pub fn reset(&mut self) {
        self.should_listen = false;
        self.halt();
        self.fatal = None;
    }

    /// Apply an event from the capture backend.
    pub fn handle(&mut self, ticket: u64, event: CaptureEvent) -> InputOutcome {
        if ticket != self.ticket {
            debug!(ticket, current = self.ticket, ?event, "dropping stale capture event");
            return InputOutcome::Ignored;
        }

        match event {
            CaptureEvent::Started => {
                debug!(ticket, "capture started");
                InputOutcome::Started
            }
            CaptureEvent::Interim(text) => {
                trace!(ticket, %text, "interim result");
                InputOutcome::Ignored
            }
            CaptureEvent::Final(text) => {
                let text = text.trim();
                if text.is_empty() {
                    return InputOutcome::Ignored;
                }
                InputOutcome::Utterance(text.to_string())
            }
            CaptureEvent::NoSpeech => {
                debug!(ticket, "no speech detected");
                InputOutcome::Ignored
            }
            CaptureEvent::Failed(reason) => {
                warn!(ticket, %reason, "capture error");
                InputOutcome::Ignored
            }
            CaptureEvent::Denied(reason) => {
                warn!(ticket, %reason, "microphone access denied");
                self.halt();
                self.fatal = Some(reason.clone());
                InputOutcome::Denied(reason)
            }
            CaptureEvent::Ended => {
                self.capturing = false;
                if self.should_listen && self.fatal.is_none() {
                    debug!(
                        ticket,
                        delay_ms = self.restart_delay.as_millis() as u64,
                        "capture ended, scheduling restart"
                    );
                    self.schedule_restart();
                } else {
                    debug!(ticket, "capture ended");
                }
                InputOutcome::Stopped
            }
        }
    }

    /// The restart delay for `ticket` elapsed.
    pub fn restart_due(&mut self, ticket: u64) -> Option<InputOutcome> {
        if ticket != self.ticket || self.restart.is_none() {
            debug!(ticket, current = self.ticket, "dropping stale capture restart");
            return None;
        }
        self.restart = None;
        if !self.should_listen {
            return None;
        }
        self.begin()
    }

    fn begin(&mut self) -> Option<InputOutcome> {
        if self.capturing {
            return None;
        }
        if let Some(reason) = &self.fatal {
            debug!(%reason, "capture blocked by persistent error");
            return None;
        }
        self.cancel_restart();
        self.ticket += 1;

        let events = CaptureEvents::new(self.ticket, self.events.clone());
        match self.backend.start(events) {
            Ok(()) => {
                self.capturing = true;
                None
            }
            Err(e) if e.is_fatal_capture() => {
                warn!(ticket = self.ticket, error = %e, "capture cannot start");
                let reason = match e {
                    ParleyError::CapturePermissionDenied { message }
                    | ParleyError::CaptureUnavailable { message } => message,
                    other => other.to_string(),
                };
                self.fatal = Some(reason.clone());
                Some(InputOutcome::Denied(reason))
            }
            Err(e) => {
                warn!(ticket = self.ticket, error = %e, "capture start failed, will retry");
                self.schedule_restart();
                None
            }
        }
    }

    fn halt(&mut self) {
        self.cancel_restart();
        if !self.capturing {
            return;
        }
        self.capturing = false;
        // The run's own Ended now carries a stale ticket.
        self.ticket += 1;
        if let Err(e) = self.backend.stop() {
            warn!(error = %e, "failed to stop capture");
        }
    }

    fn schedule_restart(&mut self) {
        self.restart = Some(ScheduledTask::after(
            self.restart_delay,
            self.events.clone(),
            SessionEvent::CaptureRestartDue {
                ticket: self.ticket,
            },
        ));
    }

    fn cancel_restart(&mut self) {
        if let Some(task) = self.restart.take() {
            task.cancel();
        }
    }
}
