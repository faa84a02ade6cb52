//! The single event type consumed by the session loop.
//!
//! Every asynchronous source (peer connection, capture, playback, timers and
//! user commands) posts a [`SessionEvent`] into one unbounded channel. The
//! loop handles one event to completion before taking the next, so session
//! transitions never interleave.

use crate::connection::manager::ConnectionSignal;
use crate::speech::capture::CaptureEvent;
use crate::speech::playback::PlaybackEvent;
use tokio::sync::mpsc;

/// Commands issued by the user (or the embedding UI).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    /// Start a fresh call.
    Start,
    /// End the current call.
    End,
    /// Set the microphone mute state.
    SetMuted(bool),
    /// Flip the microphone mute state.
    ToggleMute,
    /// Dismiss the status banner and any persistent capture error.
    ClearError,
    /// Empty the transcript without touching the call.
    ClearTranscript,
    /// End the call and stop the session loop.
    Shutdown,
}

#[derive(Debug)]
pub enum SessionEvent {
    Command(SessionCommand),
    /// Raw signal from a connection pump task or the reconnect timer.
    Connection(ConnectionSignal),
    /// Capture backend event, tagged with the ticket of the capture run.
    Capture { ticket: u64, event: CaptureEvent },
    /// Capture restart delay elapsed.
    CaptureRestartDue { ticket: u64 },
    /// Playback backend event, tagged with the utterance id.
    Playback { utterance: u64, event: PlaybackEvent },
    /// Elapsed-time tick for the call started in `epoch`.
    Tick { epoch: u64 },
}

pub type EventSender = mpsc::UnboundedSender<SessionEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

/// Create the session event channel.
pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

impl From<SessionCommand> for SessionEvent {
    fn from(command: SessionCommand) -> Self {
        SessionEvent::Command(command)
    }
}
