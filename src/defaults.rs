//! Default configuration constants for parley.
//!
//! Shared by the config layer and the session components so both agree on
//! the timing and voice defaults.

/// Default interview server endpoint.
pub const SERVER_URL: &str = "ws://localhost:8000/ws/interview/";

/// Delay before a reconnect attempt after an unexpected close, in milliseconds.
///
/// Exactly one attempt is scheduled per close; attempts are not capped while
/// the session stays active.
pub const RECONNECT_DELAY_MS: u64 = 3000;

/// Delay before capture restarts after it ended on its own, in milliseconds.
///
/// Recognizers stop after any stretch of silence; half a second keeps the
/// restart from spinning while still catching the next sentence.
pub const CAPTURE_RESTART_DELAY_MS: u64 = 500;

/// Period of the elapsed-time tick, in milliseconds.
pub const TICK_INTERVAL_MS: u64 = 1000;

/// Language tag handed to the recognizer.
pub const CAPTURE_LANGUAGE: &str = "en-US";

/// Text-to-speech program used for spoken playback.
pub const TTS_COMMAND: &str = "espeak-ng";

/// Unity playback rate.
pub const PLAYBACK_RATE: f32 = 1.0;

/// Unity playback pitch.
pub const PLAYBACK_PITCH: f32 = 1.0;

/// Full playback volume.
pub const PLAYBACK_VOLUME: f32 = 1.0;

/// Banner text shown while waiting for a reconnect attempt.
pub const RECONNECTING_MESSAGE: &str = "Reconnecting...";

/// Banner text for a failed or dropped connection.
pub const CONNECTION_ERROR_MESSAGE: &str = "Connection error";

/// Banner text for a peer error without a message.
pub const SERVER_ERROR_MESSAGE: &str = "Server error";

/// Banner text when an utterance could not be delivered.
pub const SEND_FAILED_MESSAGE: &str = "Failed to send message to server.";
