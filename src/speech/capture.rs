use crate::config::CaptureConfig;
use crate::error::{ParleyError, Result};
use crate::event::{EventSender, SessionEvent};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Something a capture backend observed during one capture run.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    /// Capture is live.
    Started,
    /// Still-revisable recognition. Informational only.
    Interim(String),
    /// A finalized utterance.
    Final(String),
    /// The recognizer heard nothing before timing out. `Ended` follows.
    NoSpeech,
    /// Microphone permission refused. `Ended` follows.
    Denied(String),
    /// Any other recognizer error. `Ended` follows.
    Failed(String),
    /// The run is over. Sent exactly once per started run.
    Ended,
}

/// Emitter handed to a backend for one capture run.
///
/// Tags every event with the run's ticket so events from an abandoned run
/// can be told apart from the current one.
#[derive(Debug, Clone)]
pub struct CaptureEvents {
    ticket: u64,
    tx: EventSender,
}

impl CaptureEvents {
    pub fn new(ticket: u64, tx: EventSender) -> Self {
        Self { ticket, tx }
    }

    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    /// Post an event. Returns false once the session loop is gone.
    pub fn emit(&self, event: CaptureEvent) -> bool {
        self.tx
            .send(SessionEvent::Capture {
                ticket: self.ticket,
                event,
            })
            .is_ok()
    }
}

/// Trait for speech capture devices.
///
/// This trait allows swapping implementations (real recognizer vs mock).
pub trait CaptureBackend: Send {
    /// Begin a capture run, reporting through `events`.
    ///
    /// Any handle left from an earlier run must be released first.
    /// Return `CapturePermissionDenied` or `CaptureUnavailable` when capture
    /// can never work; other errors are retried.
    fn start(&mut self, events: CaptureEvents) -> Result<()>;

    /// End the current run. Stopping while stopped is a no-op.
    fn stop(&mut self) -> Result<()>;
}

/// Recognizer settings shared by capture backends.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSettings {
    pub language: String,
    pub continuous: bool,
    pub interim_results: bool,
}

impl From<&CaptureConfig> for CaptureSettings {
    fn from(config: &CaptureConfig) -> Self {
        Self {
            language: config.language.clone(),
            continuous: config.continuous,
            interim_results: config.interim_results,
        }
    }
}

type ActiveRun = Arc<Mutex<Option<CaptureEvents>>>;

fn lock_run(run: &ActiveRun) -> MutexGuard<'_, Option<CaptureEvents>> {
    run.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Capture backend for terminals: each line typed while capture is running
/// is one finalized utterance.
///
/// Lines typed while capture is stopped (muted, peer speaking, offline) are
/// refused, just as a microphone that is off hears nothing.
#[derive(Debug, Clone)]
pub struct LineCapture {
    settings: CaptureSettings,
    active: ActiveRun,
}

/// Writer side of a [`LineCapture`].
#[derive(Debug, Clone)]
pub struct LineFeed {
    settings: CaptureSettings,
    active: ActiveRun,
}

impl LineCapture {
    pub fn new(settings: CaptureSettings) -> Self {
        Self {
            settings,
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// Handle for pushing typed lines into this backend.
    pub fn feed(&self) -> LineFeed {
        LineFeed {
            settings: self.settings.clone(),
            active: Arc::clone(&self.active),
        }
    }
}

impl LineFeed {
    /// Submit one typed line. Returns false if capture is not running.
    pub fn submit(&self, line: &str) -> bool {
        let mut active = lock_run(&self.active);
        let Some(events) = active.as_ref() else {
            return false;
        };

        let text = line.trim();
        if text.is_empty() {
            return events.emit(CaptureEvent::NoSpeech);
        }
        if !events.emit(CaptureEvent::Final(text.to_string())) {
            return false;
        }
        if !self.settings.continuous {
            // Single-shot recognizers end after each result.
            if let Some(events) = active.take() {
                events.emit(CaptureEvent::Ended);
            }
        }
        true
    }

    /// Whether typed lines are currently accepted.
    pub fn is_listening(&self) -> bool {
        lock_run(&self.active).is_some()
    }
}

impl CaptureBackend for LineCapture {
    fn start(&mut self, events: CaptureEvents) -> Result<()> {
        let mut active = lock_run(&self.active);
        if let Some(previous) = active.take() {
            previous.emit(CaptureEvent::Ended);
        }
        tracing::debug!(
            ticket = events.ticket(),
            language = %self.settings.language,
            "line capture started"
        );
        if !events.emit(CaptureEvent::Started) {
            return Err(ParleyError::Capture {
                message: "session loop stopped".to_string(),
            });
        }
        *active = Some(events);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(events) = lock_run(&self.active).take() {
            tracing::debug!(ticket = events.ticket(), "line capture stopped");
            events.emit(CaptureEvent::Ended);
        }
        Ok(())
    }
}

/// How a [`MockCapture`] start should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockStartFailure {
    Denied,
    Unavailable,
    Busy,
}

#[derive(Debug, Default)]
struct MockCaptureState {
    running: Option<CaptureEvents>,
    starts: usize,
    stops: usize,
    fail_next_start: Option<MockStartFailure>,
}

/// Mock capture backend for testing.
///
/// Clones share state, so a test keeps one clone and hands the other to the
/// session.
#[derive(Debug, Clone, Default)]
pub struct MockCapture {
    state: Arc<Mutex<MockCaptureState>>,
}

impl MockCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next start fail.
    pub fn fail_next_start(&self, failure: MockStartFailure) {
        self.lock().fail_next_start = Some(failure);
    }

    /// Check if a capture run is live
    pub fn is_running(&self) -> bool {
        self.lock().running.is_some()
    }

    pub fn start_count(&self) -> usize {
        self.lock().starts
    }

    pub fn stop_count(&self) -> usize {
        self.lock().stops
    }

    /// Ticket of the live run.
    pub fn ticket(&self) -> Option<u64> {
        self.lock().running.as_ref().map(CaptureEvents::ticket)
    }

    /// Recognize a finalized utterance. Returns false if not running.
    pub fn say(&self, text: &str) -> bool {
        self.emit(CaptureEvent::Final(text.to_string()))
    }

    /// Emit an event on the live run. Returns false if not running.
    pub fn emit(&self, event: CaptureEvent) -> bool {
        self.lock()
            .running
            .as_ref()
            .is_some_and(|events| events.emit(event))
    }

    /// End the run on its own after silence.
    pub fn end_silently(&self) {
        if let Some(events) = self.lock().running.take() {
            events.emit(CaptureEvent::NoSpeech);
            events.emit(CaptureEvent::Ended);
        }
    }

    /// Refuse microphone permission mid-run.
    pub fn deny(&self) {
        if let Some(events) = self.lock().running.take() {
            events.emit(CaptureEvent::Denied("not-allowed".to_string()));
            events.emit(CaptureEvent::Ended);
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockCaptureState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CaptureBackend for MockCapture {
    fn start(&mut self, events: CaptureEvents) -> Result<()> {
        let mut state = self.lock();
        state.starts += 1;
        match state.fail_next_start.take() {
            Some(MockStartFailure::Denied) => {
                return Err(ParleyError::CapturePermissionDenied {
                    message: "mock permission denied".to_string(),
                });
            }
            Some(MockStartFailure::Unavailable) => {
                return Err(ParleyError::CaptureUnavailable {
                    message: "mock recognizer missing".to_string(),
                });
            }
            Some(MockStartFailure::Busy) => {
                return Err(ParleyError::Capture {
                    message: "mock device busy".to_string(),
                });
            }
            None => {}
        }
        if let Some(previous) = state.running.take() {
            previous.emit(CaptureEvent::Ended);
        }
        events.emit(CaptureEvent::Started);
        state.running = Some(events);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let mut state = self.lock();
        state.stops += 1;
        if let Some(events) = state.running.take() {
            events.emit(CaptureEvent::Ended);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{self, EventReceiver};

    fn settings(continuous: bool) -> CaptureSettings {
        CaptureSettings {
            language: "en-US".to_string(),
            continuous,
            interim_results: false,
        }
    }

    fn drain(rx: &mut EventReceiver) -> Vec<(u64, CaptureEvent)> {
        let mut out = Vec::new();
        while let Ok(SessionEvent::Capture { ticket, event }) = rx.try_recv() {
            out.push((ticket, event));
        }
        out
    }

    #[test]
    fn test_capture_settings_from_config() {
        let settings = CaptureSettings::from(&CaptureConfig::default());
        assert_eq!(settings.language, "en-US");
        assert!(settings.continuous);
        assert!(!settings.interim_results);
    }

    #[test]
    fn test_line_capture_refuses_lines_while_stopped() {
        let capture = LineCapture::new(settings(true));
        let feed = capture.feed();

        assert!(!feed.is_listening());
        assert!(!feed.submit("hello"));
    }

    #[test]
    fn test_line_capture_emits_final_utterances() {
        let (tx, mut rx) = event::channel();
        let mut capture = LineCapture::new(settings(true));
        let feed = capture.feed();

        capture.start(CaptureEvents::new(4, tx)).unwrap();
        assert!(feed.submit("  Hello there  "));
        capture.stop().unwrap();

        assert_eq!(
            drain(&mut rx),
            vec![
                (4, CaptureEvent::Started),
                (4, CaptureEvent::Final("Hello there".to_string())),
                (4, CaptureEvent::Ended),
            ]
        );
        assert!(!feed.submit("after stop"));
    }

    #[test]
    fn test_line_capture_blank_line_is_no_speech() {
        let (tx, mut rx) = event::channel();
        let mut capture = LineCapture::new(settings(true));
        let feed = capture.feed();

        capture.start(CaptureEvents::new(1, tx)).unwrap();
        feed.submit("   ");

        let events = drain(&mut rx);
        assert_eq!(events.last(), Some(&(1, CaptureEvent::NoSpeech)));
    }

    #[test]
    fn test_line_capture_single_shot_ends_after_result() {
        let (tx, mut rx) = event::channel();
        let mut capture = LineCapture::new(settings(false));
        let feed = capture.feed();

        capture.start(CaptureEvents::new(2, tx)).unwrap();
        assert!(feed.submit("one"));
        assert!(!feed.submit("two"));

        assert_eq!(
            drain(&mut rx),
            vec![
                (2, CaptureEvent::Started),
                (2, CaptureEvent::Final("one".to_string())),
                (2, CaptureEvent::Ended),
            ]
        );
    }

    #[test]
    fn test_line_capture_restart_releases_previous_run() {
        let (tx, mut rx) = event::channel();
        let mut capture = LineCapture::new(settings(true));

        capture.start(CaptureEvents::new(1, tx.clone())).unwrap();
        capture.start(CaptureEvents::new(2, tx)).unwrap();

        assert_eq!(
            drain(&mut rx),
            vec![
                (1, CaptureEvent::Started),
                (1, CaptureEvent::Ended),
                (2, CaptureEvent::Started),
            ]
        );
    }

    #[test]
    fn test_mock_capture_counts_and_failures() {
        let (tx, mut rx) = event::channel();
        let mock = MockCapture::new();
        let mut backend = mock.clone();

        mock.fail_next_start(MockStartFailure::Denied);
        let err = backend.start(CaptureEvents::new(1, tx.clone())).unwrap_err();
        assert!(err.is_fatal_capture());
        assert!(!mock.is_running());

        backend.start(CaptureEvents::new(2, tx)).unwrap();
        assert!(mock.is_running());
        assert_eq!(mock.ticket(), Some(2));
        assert!(mock.say("hi"));

        backend.stop().unwrap();
        backend.stop().unwrap();
        assert_eq!(mock.start_count(), 2);
        assert_eq!(mock.stop_count(), 2);
        assert!(!mock.say("gone"));

        assert_eq!(
            drain(&mut rx),
            vec![
                (2, CaptureEvent::Started),
                (2, CaptureEvent::Final("hi".to_string())),
                (2, CaptureEvent::Ended),
            ]
        );
    }
}
