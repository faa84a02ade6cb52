//! Terminal rendering of session snapshots.
//!
//! The renderer compares each snapshot with the previous one and prints only
//! what changed: new transcript entries, connection and mute changes, turn
//! hints and banners.

use crate::connection::ConnectionState;
use crate::session::{BannerKind, SessionSnapshot, SessionStatus, TurnState, format_elapsed};
use owo_colors::OwoColorize;

/// Human label for a connection state.
pub fn connection_label(state: ConnectionState) -> &'static str {
    match state {
        ConnectionState::Connected => "Connected",
        ConnectionState::Connecting => "Connecting...",
        ConnectionState::Disconnected => "Disconnected",
        ConnectionState::Errored => "Connection Error",
    }
}

/// Prints snapshot changes line by line.
#[derive(Debug, Default)]
pub struct Renderer {
    previous: SessionSnapshot,
    last_sequence: u64,
    last_elapsed: u64,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Elapsed time of the current (or most recently ended) call.
    pub fn call_duration(&self) -> u64 {
        self.last_elapsed
    }

    /// Print everything that changed since the previous snapshot.
    pub fn render(&mut self, snapshot: &SessionSnapshot) {
        for line in self.changes(snapshot) {
            println!("{}", line);
        }
    }

    /// Lines describing what changed since the previous snapshot.
    pub fn changes(&mut self, snapshot: &SessionSnapshot) -> Vec<String> {
        let previous = std::mem::replace(&mut self.previous, snapshot.clone());
        let mut lines = Vec::new();

        if snapshot.status != previous.status {
            match snapshot.status {
                SessionStatus::Active => {
                    self.last_elapsed = 0;
                    lines.push(format!("{} Call started", "●".green()));
                }
                SessionStatus::Ended => lines.push(format!(
                    "{} Call ended ({})",
                    "■".red(),
                    format_elapsed(self.last_elapsed)
                )),
                SessionStatus::Idle => {}
            }
        }
        if snapshot.is_active() {
            self.last_elapsed = snapshot.elapsed_seconds;
        }

        if snapshot.connection != previous.connection && snapshot.is_active() {
            let label = connection_label(snapshot.connection);
            let line = match snapshot.connection {
                ConnectionState::Connected => label.green().to_string(),
                ConnectionState::Errored => label.red().to_string(),
                ConnectionState::Connecting | ConnectionState::Disconnected => {
                    label.dimmed().to_string()
                }
            };
            lines.push(line);
        }

        if snapshot.muted != previous.muted && snapshot.is_active() {
            let line = if snapshot.muted {
                "Microphone muted".yellow().to_string()
            } else {
                "Microphone unmuted".dimmed().to_string()
            };
            lines.push(line);
        }

        if snapshot.transcript.is_empty() && !previous.transcript.is_empty() {
            lines.push("Transcript cleared".dimmed().to_string());
        }
        for entry in &snapshot.transcript {
            if entry.sequence <= self.last_sequence {
                continue;
            }
            self.last_sequence = entry.sequence;
            let label = format!("{}:", entry.speaker.label());
            lines.push(format!("{} {}", label.bold(), entry.text));
        }

        if snapshot.turn != previous.turn && snapshot.is_active() {
            let hint = match snapshot.turn {
                TurnState::Listening => Some("Listening... type your answer"),
                TurnState::AwaitingReply => Some("Waiting for the interviewer..."),
                TurnState::PeerSpeaking => Some("Interviewer is responding..."),
                TurnState::Idle => None,
            };
            if let Some(hint) = hint {
                lines.push(hint.dimmed().to_string());
            }
        }

        if snapshot.banner != previous.banner
            && let Some(banner) = &snapshot.banner
        {
            let line = match banner.kind {
                BannerKind::Error | BannerKind::Connection => {
                    format!("! {}", banner.message).red().to_string()
                }
                BannerKind::Reconnecting => format!("… {}", banner.message).yellow().to_string(),
            };
            lines.push(line);
        }

        if snapshot.capture_error != previous.capture_error
            && let Some(reason) = &snapshot.capture_error
        {
            lines.push(format!(
                "{} ({}). Type /dismiss to retry.",
                "Microphone unavailable".red(),
                reason
            ));
        }

        lines
    }
}

/// Strip ANSI escape sequences, for comparing rendered lines.
#[cfg(test)]
fn plain(line: &str) -> String {
    let mut out = String::new();
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        if c == '\x1b' {
            for c in chars.by_ref() {
                if c == 'm' {
                    break;
                }
            }
            continue;
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::StatusBanner;
    use crate::transcript::{Speaker, TranscriptEntry};

    fn entry(speaker: Speaker, text: &str, sequence: u64) -> TranscriptEntry {
        TranscriptEntry {
            speaker,
            text: text.to_string(),
            sequence,
        }
    }

    fn active() -> SessionSnapshot {
        SessionSnapshot {
            status: SessionStatus::Active,
            ..SessionSnapshot::default()
        }
    }

    fn plain_changes(renderer: &mut Renderer, snapshot: &SessionSnapshot) -> Vec<String> {
        renderer
            .changes(snapshot)
            .iter()
            .map(|line| plain(line))
            .collect()
    }

    #[test]
    fn test_connection_labels() {
        assert_eq!(connection_label(ConnectionState::Connected), "Connected");
        assert_eq!(
            connection_label(ConnectionState::Errored),
            "Connection Error"
        );
    }

    #[test]
    fn test_unchanged_snapshot_prints_nothing() {
        let mut renderer = Renderer::new();
        let snapshot = active();
        renderer.changes(&snapshot);
        assert!(renderer.changes(&snapshot).is_empty());
    }

    #[test]
    fn test_new_entries_printed_once() {
        let mut renderer = Renderer::new();
        renderer.changes(&active());

        let mut snapshot = active();
        snapshot.transcript = vec![entry(Speaker::User, "Hello", 1)];
        assert_eq!(plain_changes(&mut renderer, &snapshot), vec!["You: Hello"]);

        snapshot.transcript.push(entry(Speaker::Peer, "Hi there.", 2));
        assert_eq!(
            plain_changes(&mut renderer, &snapshot),
            vec!["AI: Hi there."]
        );
    }

    #[test]
    fn test_cleared_transcript_announced() {
        let mut renderer = Renderer::new();
        let mut snapshot = active();
        snapshot.transcript = vec![entry(Speaker::User, "Hello", 1)];
        renderer.changes(&snapshot);

        snapshot.transcript.clear();
        assert_eq!(
            plain_changes(&mut renderer, &snapshot),
            vec!["Transcript cleared"]
        );

        snapshot.transcript = vec![entry(Speaker::User, "Again", 2)];
        assert_eq!(plain_changes(&mut renderer, &snapshot), vec!["You: Again"]);
    }

    #[test]
    fn test_banner_and_turn_hints() {
        let mut renderer = Renderer::new();
        renderer.changes(&active());

        let mut snapshot = active();
        snapshot.turn = TurnState::PeerSpeaking;
        snapshot.banner = Some(StatusBanner::reconnecting("Reconnecting..."));
        assert_eq!(
            plain_changes(&mut renderer, &snapshot),
            vec!["Interviewer is responding...", "… Reconnecting..."]
        );
    }

    #[test]
    fn test_call_summary_keeps_duration() {
        let mut renderer = Renderer::new();
        let mut snapshot = active();
        snapshot.elapsed_seconds = 75;
        renderer.changes(&snapshot);

        let ended = SessionSnapshot {
            status: SessionStatus::Ended,
            ..SessionSnapshot::default()
        };
        assert_eq!(
            plain_changes(&mut renderer, &ended),
            vec!["■ Call ended (01:15)"]
        );
        assert_eq!(renderer.call_duration(), 75);
    }
}
