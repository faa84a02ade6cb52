//! Append-only record of the conversation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Who produced a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Peer,
}

impl Speaker {
    /// Prefix used when the transcript is rendered as text.
    pub fn label(&self) -> &'static str {
        match self {
            Speaker::User => "You",
            Speaker::Peer => "AI",
        }
    }
}

/// One finalized utterance or reply. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    pub text: String,
    pub sequence: u64,
}

impl fmt::Display for TranscriptEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.speaker.label(), self.text)
    }
}

/// Ordered transcript with sequence numbers assigned at append time.
///
/// Sequence numbers keep increasing across [`TranscriptLog::clear`], so an
/// observer holding the last sequence it saw never mistakes a new entry for
/// an old one.
#[derive(Debug, Default, Clone)]
pub struct TranscriptLog {
    entries: Vec<TranscriptEntry>,
    next_sequence: u64,
}

impl TranscriptLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry and return the sequence number it was given.
    pub fn append(&mut self, speaker: Speaker, text: impl Into<String>) -> u64 {
        self.next_sequence += 1;
        let sequence = self.next_sequence;
        self.entries.push(TranscriptEntry {
            speaker,
            text: text.into(),
            sequence,
        });
        sequence
    }

    /// All entries in sequence order.
    pub fn read_all(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render as `You: ...` / `AI: ...` paragraphs separated by blank lines.
    pub fn render(&self) -> String {
        render_entries(&self.entries)
    }
}

/// Render entries as `You: ...` / `AI: ...` paragraphs separated by blank lines.
pub fn render_entries(entries: &[TranscriptEntry]) -> String {
    entries
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n\n")
}
