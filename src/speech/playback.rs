use crate::config::PlaybackConfig;
use crate::error::{ParleyError, Result};
use crate::event::{EventSender, SessionEvent};
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::process::Command;
use tokio::sync::oneshot;

/// Progress of one spoken utterance.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    Started,
    Ended,
    Errored(String),
}

/// Emitter handed to a backend for one utterance.
#[derive(Debug, Clone)]
pub struct PlaybackEvents {
    utterance: u64,
    tx: EventSender,
}

impl PlaybackEvents {
    pub fn new(utterance: u64, tx: EventSender) -> Self {
        Self { utterance, tx }
    }

    pub fn utterance(&self) -> u64 {
        self.utterance
    }

    /// Post an event. Returns false once the session loop is gone.
    pub fn emit(&self, event: PlaybackEvent) -> bool {
        self.tx
            .send(SessionEvent::Playback {
                utterance: self.utterance,
                event,
            })
            .is_ok()
    }
}

/// Voice parameters. 1.0 is the synthesizer's normal rate and pitch; volume
/// runs from 0.0 to 1.0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Voice {
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

impl Default for Voice {
    fn default() -> Self {
        Self::from(&PlaybackConfig::default())
    }
}

impl From<&PlaybackConfig> for Voice {
    fn from(config: &PlaybackConfig) -> Self {
        Self {
            rate: config.rate,
            pitch: config.pitch,
            volume: config.volume,
        }
    }
}

/// Text to speak, with the id its events are tagged with.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub id: u64,
    pub text: String,
    pub voice: Voice,
}

/// Trait for spoken output devices.
pub trait PlaybackBackend: Send {
    /// Begin speaking. The backend reports `Started` and then `Ended` or
    /// `Errored` through `events`.
    ///
    /// Fails immediately with `PlaybackUnavailable` if nothing can speak.
    fn speak(&mut self, utterance: &Utterance, events: PlaybackEvents) -> Result<()>;

    /// Stop the current utterance, if any. A cancelled utterance reports
    /// nothing further.
    fn cancel(&mut self);
}

/// Speaks through an external text-to-speech program (espeak-ng by default).
#[derive(Debug)]
pub struct CommandSpeaker {
    program: String,
    current: Option<oneshot::Sender<()>>,
}

impl CommandSpeaker {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            current: None,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Build espeak-compatible arguments for an utterance.
    ///
    /// Unity rate is 175 words per minute, unity pitch 50, full volume an
    /// amplitude of 100.
    pub fn args(utterance: &Utterance) -> Vec<String> {
        let voice = utterance.voice;
        vec![
            "-s".to_string(),
            format!("{}", (175.0 * voice.rate).round() as u32),
            "-p".to_string(),
            format!("{}", (50.0 * voice.pitch).round().min(99.0) as u32),
            "-a".to_string(),
            format!("{}", (100.0 * voice.volume).round() as u32),
            "--".to_string(),
            utterance.text.clone(),
        ]
    }

    /// Check whether the program can be run at all.
    pub async fn probe(&self) -> Result<String> {
        let output = Command::new(&self.program)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;
        let version = String::from_utf8_lossy(&output.stdout);
        Ok(version.lines().next().unwrap_or_default().trim().to_string())
    }

    fn spawn_error(&self, e: std::io::Error) -> ParleyError {
        if e.kind() == std::io::ErrorKind::NotFound {
            ParleyError::PlaybackUnavailable {
                message: format!("{} not found", self.program),
            }
        } else {
            ParleyError::Playback {
                message: format!("Failed to run {}: {}", self.program, e),
            }
        }
    }
}

impl PlaybackBackend for CommandSpeaker {
    fn speak(&mut self, utterance: &Utterance, events: PlaybackEvents) -> Result<()> {
        self.cancel();

        let mut child = Command::new(&self.program)
            .args(Self::args(utterance))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let (kill_tx, kill_rx) = oneshot::channel();
        self.current = Some(kill_tx);
        events.emit(PlaybackEvent::Started);
        tracing::debug!(utterance = utterance.id, program = %self.program, "speaking");

        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => {
                    let event = match status {
                        Ok(status) if status.success() => PlaybackEvent::Ended,
                        Ok(status) => PlaybackEvent::Errored(format!("synthesizer exited with {}", status)),
                        Err(e) => PlaybackEvent::Errored(e.to_string()),
                    };
                    events.emit(event);
                }
                _ = kill_rx => {
                    if let Err(e) = child.kill().await {
                        tracing::debug!(error = %e, "failed to stop synthesizer");
                    }
                }
            }
        });
        Ok(())
    }

    fn cancel(&mut self) {
        if let Some(kill) = self.current.take()
            && kill.send(()).is_err()
        {
            tracing::trace!("synthesizer already finished");
        }
    }
}

/// Text-only playback: every utterance starts and ends at once.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentSpeaker;

impl PlaybackBackend for SilentSpeaker {
    fn speak(&mut self, _utterance: &Utterance, events: PlaybackEvents) -> Result<()> {
        events.emit(PlaybackEvent::Started);
        events.emit(PlaybackEvent::Ended);
        Ok(())
    }

    fn cancel(&mut self) {}
}

#[derive(Debug, Default)]
struct MockSpeakerState {
    spoken: Vec<Utterance>,
    current: Option<PlaybackEvents>,
    cancels: usize,
    unavailable: bool,
}

/// Mock playback backend for testing.
///
/// Utterances play until the test calls [`MockSpeaker::finish`] or
/// [`MockSpeaker::fail`].
#[derive(Debug, Clone, Default)]
pub struct MockSpeaker {
    state: Arc<Mutex<MockSpeakerState>>,
}

impl MockSpeaker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later `speak` fail with `PlaybackUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Texts passed to `speak`, in order.
    pub fn spoken(&self) -> Vec<String> {
        self.lock().spoken.iter().map(|u| u.text.clone()).collect()
    }

    /// Most recent utterance passed to `speak`.
    pub fn last_utterance(&self) -> Option<Utterance> {
        self.lock().spoken.last().cloned()
    }

    pub fn is_playing(&self) -> bool {
        self.lock().current.is_some()
    }

    pub fn cancel_count(&self) -> usize {
        self.lock().cancels
    }

    /// Finish the current utterance.
    pub fn finish(&self) -> bool {
        self.complete(PlaybackEvent::Ended)
    }

    /// Fail the current utterance.
    pub fn fail(&self, reason: &str) -> bool {
        self.complete(PlaybackEvent::Errored(reason.to_string()))
    }

    fn complete(&self, event: PlaybackEvent) -> bool {
        self.lock()
            .current
            .take()
            .is_some_and(|events| events.emit(event))
    }

    fn lock(&self) -> MutexGuard<'_, MockSpeakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PlaybackBackend for MockSpeaker {
    fn speak(&mut self, utterance: &Utterance, events: PlaybackEvents) -> Result<()> {
        let mut state = self.lock();
        if state.unavailable {
            return Err(ParleyError::PlaybackUnavailable {
                message: "mock speaker disabled".to_string(),
            });
        }
        state.spoken.push(utterance.clone());
        events.emit(PlaybackEvent::Started);
        state.current = Some(events);
        Ok(())
    }

    fn cancel(&mut self) {
        let mut state = self.lock();
        state.cancels += 1;
        state.current = None;
    }
}
