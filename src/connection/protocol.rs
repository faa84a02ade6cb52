//! JSON message protocol spoken with the interview peer.
//!
//! Each WebSocket text frame carries one independent JSON object tagged by
//! its `type` field.

use serde::{Deserialize, Serialize};

/// Messages sent by the client to the peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// A finalized user utterance
    Transcript { text: String },
}

impl ClientMessage {
    /// Serialize message to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize message from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// Messages sent by the peer to the client.
///
/// Text fields default to empty when the peer omits them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PeerMessage {
    /// Greeting after the channel opened
    Connected {
        #[serde(default)]
        message: String,
    },
    /// A streamed reply begins
    AiResponseStart,
    /// A piece of the streamed reply
    AiResponseChunk {
        #[serde(default)]
        text: String,
    },
    /// The streamed reply is complete
    AiResponseEnd {
        #[serde(default)]
        full_text: String,
    },
    /// The peer is working on a reply
    Processing {
        #[serde(default)]
        message: String,
    },
    /// The peer reports a failure
    Error {
        #[serde(default)]
        message: String,
    },
    /// Informational notice
    Info {
        #[serde(default)]
        message: String,
    },
}

impl PeerMessage {
    /// Serialize message to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize message from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcript_json_format() {
        let msg = ClientMessage::Transcript {
            text: "Hello".to_string(),
        };
        assert_eq!(
            msg.to_json().unwrap(),
            r#"{"type":"transcript","text":"Hello"}"#
        );
    }

    #[test]
    fn test_transcript_with_special_chars() {
        let msg = ClientMessage::Transcript {
            text: r#"I said "yes" \ twice"#.to_string(),
        };
        let json = msg.to_json().expect("should serialize");
        let parsed = ClientMessage::from_json(&json).expect("should deserialize");
        assert_eq!(msg, parsed);
    }

    #[test]
    fn test_parse_stream_messages() {
        assert_eq!(
            PeerMessage::from_json(r#"{"type": "ai_response_start"}"#).unwrap(),
            PeerMessage::AiResponseStart
        );
        assert_eq!(
            PeerMessage::from_json(r#"{"type": "ai_response_chunk", "text": "Hi "}"#).unwrap(),
            PeerMessage::AiResponseChunk {
                text: "Hi ".to_string()
            }
        );
        assert_eq!(
            PeerMessage::from_json(r#"{"type": "ai_response_end", "full_text": "Hi there."}"#)
                .unwrap(),
            PeerMessage::AiResponseEnd {
                full_text: "Hi there.".to_string()
            }
        );
    }

    #[test]
    fn test_parse_status_messages() {
        let cases = [
            (
                r#"{"type":"connected","message":"welcome"}"#,
                PeerMessage::Connected {
                    message: "welcome".to_string(),
                },
            ),
            (
                r#"{"type":"processing","message":"thinking"}"#,
                PeerMessage::Processing {
                    message: "thinking".to_string(),
                },
            ),
            (
                r#"{"type":"error","message":"quota exceeded"}"#,
                PeerMessage::Error {
                    message: "quota exceeded".to_string(),
                },
            ),
            (
                r#"{"type":"info","message":"session resumed"}"#,
                PeerMessage::Info {
                    message: "session resumed".to_string(),
                },
            ),
        ];

        for (json, expected) in cases {
            assert_eq!(PeerMessage::from_json(json).unwrap(), expected, "{}", json);
        }
    }

    #[test]
    fn test_missing_text_fields_default_to_empty() {
        assert_eq!(
            PeerMessage::from_json(r#"{"type":"ai_response_chunk"}"#).unwrap(),
            PeerMessage::AiResponseChunk {
                text: String::new()
            }
        );
        assert_eq!(
            PeerMessage::from_json(r#"{"type":"ai_response_end"}"#).unwrap(),
            PeerMessage::AiResponseEnd {
                full_text: String::new()
            }
        );
        assert_eq!(
            PeerMessage::from_json(r#"{"type":"error"}"#).unwrap(),
            PeerMessage::Error {
                message: String::new()
            }
        );
    }

    #[test]
    fn test_extra_fields_are_ignored() {
        let parsed =
            PeerMessage::from_json(r#"{"type":"ai_response_start","reply_id":12}"#).unwrap();
        assert_eq!(parsed, PeerMessage::AiResponseStart);
    }

    #[test]
    fn test_invalid_json_returns_error() {
        assert!(PeerMessage::from_json(r#"{"type": "video_frame"}"#).is_err());
        assert!(PeerMessage::from_json(r#"{"text": "no type"}"#).is_err());
        assert!(PeerMessage::from_json("not json at all").is_err());
    }
}
