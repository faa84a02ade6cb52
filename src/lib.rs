//! parley - Half-duplex voice interview client
//!
//! Relays finalized utterances to a remote interviewer over a WebSocket,
//! speaks its streamed replies, and never listens while it is speaking.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

#[cfg(feature = "cli")]
pub mod app;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod connection;
pub mod defaults;
pub mod error;
pub mod event;
#[cfg(feature = "cli")]
pub mod output;
pub mod session;
pub mod speech;
pub mod timer;
pub mod transcript;

// Backend seams
pub use connection::{Connector, MockConnector, WsConnector};
pub use speech::{CaptureBackend, MockCapture, MockSpeaker, PlaybackBackend};

// Session
pub use session::{SessionHandle, SessionSnapshot, SessionStateMachine, spawn_session};

// Error handling
pub use error::{ParleyError, Result};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_starts_with_cargo_version() {
        let ver = version_string();
        assert!(
            ver.starts_with(env!("CARGO_PKG_VERSION")),
            "version_string should start with CARGO_PKG_VERSION, got: {}",
            ver
        );
    }

    #[test]
    fn version_string_has_hash_only_when_built_from_git() {
        let ver = version_string();
        if option_env!("GIT_HASH").is_some_and(|h| !h.is_empty()) {
            let hash_part = ver.split('+').nth(1).unwrap_or("");
            assert_eq!(hash_part.len(), 7, "got: {}", ver);
        } else {
            assert_eq!(ver, env!("CARGO_PKG_VERSION"));
        }
    }
}
