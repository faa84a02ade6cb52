//! Speech capture and spoken playback.

pub mod capture;
pub mod input;
pub mod output;
pub mod playback;

pub use capture::{
    CaptureBackend, CaptureEvent, CaptureEvents, CaptureSettings, LineCapture, LineFeed,
    MockCapture, MockStartFailure,
};
pub use input::{InputOutcome, SpeechInputController};
pub use output::{PlaybackOutcome, SpeechOutputController};
pub use playback::{
    CommandSpeaker, MockSpeaker, PlaybackBackend, PlaybackEvent, PlaybackEvents, SilentSpeaker,
    Utterance, Voice,
};
