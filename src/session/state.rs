//! Read-only view of a session, published after every event.

use crate::connection::ConnectionState;
use crate::transcript::TranscriptEntry;
use serde::Serialize;
use tokio::time::Instant;

/// Call lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Idle,
    Active,
    Ended,
}

/// Whose turn it is. `Listening` and `PeerSpeaking` never hold together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    #[default]
    Idle,
    Listening,
    AwaitingReply,
    PeerSpeaking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BannerKind {
    Error,
    /// Connection failure; cleared by the next successful connect.
    Connection,
    /// Waiting for a reconnect attempt; cleared by the next successful connect.
    Reconnecting,
}

/// The single user-visible status line. The most recent status wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusBanner {
    pub kind: BannerKind,
    pub message: String,
}

impl StatusBanner {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: BannerKind::Error,
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self {
            kind: BannerKind::Connection,
            message: message.into(),
        }
    }

    pub fn reconnecting(message: impl Into<String>) -> Self {
        Self {
            kind: BannerKind::Reconnecting,
            message: message.into(),
        }
    }

    /// Whether this banner only describes connection health.
    pub fn is_connection_status(&self) -> bool {
        matches!(self.kind, BannerKind::Connection | BannerKind::Reconnecting)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    /// When the current call started.
    #[serde(skip)]
    pub started_at: Option<Instant>,
    pub elapsed_seconds: u64,
    pub turn: TurnState,
    pub muted: bool,
    pub connection: ConnectionState,
    /// Capture is live right now.
    pub listening: bool,
    /// Spoken playback is in progress.
    pub speaking: bool,
    pub transcript: Vec<TranscriptEntry>,
    /// Text of the reply streaming in, before it is finalized.
    pub pending_reply: Option<String>,
    pub banner: Option<StatusBanner>,
    /// Persistent capture failure, shown until cleared.
    pub capture_error: Option<String>,
}

impl SessionSnapshot {
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Elapsed call time as `MM:SS`.
    pub fn elapsed_display(&self) -> String {
        format_elapsed(self.elapsed_seconds)
    }
}

/// Format seconds as `MM:SS`. Minutes keep counting past 59.
pub fn format_elapsed(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            status: SessionStatus::Idle,
            started_at: None,
            elapsed_seconds: 0,
            turn: TurnState::Idle,
            muted: false,
            connection: ConnectionState::Disconnected,
            listening: false,
            speaking: false,
            transcript: Vec::new(),
            pending_reply: None,
            banner: None,
            capture_error: None,
        }
    }
}
