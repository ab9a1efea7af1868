//! JSON response bodies.

use crate::params::format_marker;
use mart_core::{Backlog, Message, Replay};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Body returned by `/pub`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PubResponse {
    /// Marker of the published message, `"0"` when only configuring.
    pub etag: String,
}

impl PubResponse {
    /// Response for a publish that produced `marker`.
    #[must_use]
    pub fn new(marker: u64) -> Self {
        Self {
            etag: format_marker(marker),
        }
    }
}

/// Messages returned for one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChanResponse {
    /// Marker to send back on the next poll.
    pub etag: String,
    /// Payloads, oldest first.
    pub payload: Vec<String>,
}

impl ChanResponse {
    /// Response carrying a whole backlog.
    #[must_use]
    pub fn from_backlog(backlog: &Backlog) -> Self {
        Self {
            etag: format_marker(backlog.marker),
            payload: backlog.messages.iter().map(|m| payload_text(m)).collect(),
        }
    }

    /// Response carrying one freshly delivered message.
    #[must_use]
    pub fn from_message(message: &Message) -> Self {
        Self {
            etag: format_marker(message.created),
            payload: vec![payload_text(message)],
        }
    }
}

/// Body returned by `/sub`, and by any request that is rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubResponse {
    /// Per-channel results, keyed by channel name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub channels: BTreeMap<String, ChanResponse>,
    /// Why the request failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SubResponse {
    /// Response listing every gathered backlog.
    #[must_use]
    pub fn from_replay(replay: &Replay) -> Self {
        Self {
            channels: replay
                .iter()
                .map(|(name, backlog)| (name.clone(), ChanResponse::from_backlog(backlog)))
                .collect(),
            error: None,
        }
    }

    /// Response for a single message delivered to a parked poll.
    #[must_use]
    pub fn delivered(channel: impl Into<String>, message: &Message) -> Self {
        let mut channels = BTreeMap::new();
        channels.insert(channel.into(), ChanResponse::from_message(message));
        Self {
            channels,
            error: None,
        }
    }

    /// Error response.
    #[must_use]
    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            channels: BTreeMap::new(),
            error: Some(reason.into()),
        }
    }
}

/// Payload bytes as text; invalid UTF-8 is replaced rather than rejected.
fn payload_text(message: &Message) -> String {
    String::from_utf8_lossy(&message.payload).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_pub_response_shape() {
        let body = serde_json::to_value(PubResponse::new(1234)).unwrap();
        assert_eq!(body, json!({"etag": "1234"}));
    }

    #[test]
    fn test_replay_response_shape() {
        let mut replay = Replay::new();
        replay.insert(
            "news",
            Backlog {
                marker: 30,
                messages: vec![
                    Arc::new(Message::new("b", 20)),
                    Arc::new(Message::new("c", 30)),
                ],
            },
        );

        let body = serde_json::to_value(SubResponse::from_replay(&replay)).unwrap();
        assert_eq!(
            body,
            json!({"channels": {"news": {"etag": "30", "payload": ["b", "c"]}}})
        );
    }

    #[test]
    fn test_delivered_response_shape() {
        let message = Message::new("hi", 99);
        let body = serde_json::to_value(SubResponse::delivered("chat", &message)).unwrap();
        assert_eq!(body, json!({"channels": {"chat": {"etag": "99", "payload": ["hi"]}}}));
    }

    #[test]
    fn test_error_response_omits_channels() {
        let body = serde_json::to_value(SubResponse::error("superseded")).unwrap();
        assert_eq!(body, json!({"error": "superseded"}));
    }

    #[test]
    fn test_invalid_utf8_payload_is_replaced() {
        let message = Message::new(vec![0x68, 0xff, 0x69], 1);
        let chan = ChanResponse::from_message(&message);
        assert_eq!(chan.payload, vec!["h\u{fffd}i".to_string()]);
    }
}
