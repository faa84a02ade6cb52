//! Error types for parley.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParleyError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Peer connection errors
    #[error("Connection failed: {message}")]
    Connection { message: String },

    #[error("Not connected to the interview server")]
    NotConnected,

    #[error("Protocol error: {message}")]
    Protocol { message: String },

    // Speech capture errors
    #[error("Microphone access denied: {message}")]
    CapturePermissionDenied { message: String },

    #[error("Speech capture unavailable: {message}")]
    CaptureUnavailable { message: String },

    #[error("Speech capture failed: {message}")]
    Capture { message: String },

    // Speech playback errors
    #[error("Speech playback unavailable: {message}")]
    PlaybackUnavailable { message: String },

    #[error("Speech playback failed: {message}")]
    Playback { message: String },

    // Session loop
    #[error("Session loop is no longer running")]
    SessionClosed,

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl ParleyError {
    /// Whether a capture error means capture must not be retried this session.
    pub fn is_fatal_capture(&self) -> bool {
        matches!(
            self,
            ParleyError::CapturePermissionDenied { .. } | ParleyError::CaptureUnavailable { .. }
        )
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, ParleyError>;
