//! Data-path payload: what actually travels over an open peer channel.
//!
//! Peers send either raw text (taken verbatim as a chat message) or JSON
//! with a `type` discriminator. Anything ambiguous is treated as plain text
//! rather than dropped, to stay compatible with heterogeneous peers.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Structured payload exchanged over a peer's data path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChatPayload {
    Message {
        user: String,
        text: String,
        timestamp: u64,
    },
    Typing {
        user: String,
        #[serde(rename = "isTyping")]
        is_typing: bool,
        timestamp: u64,
    },
}

impl ChatPayload {
    pub fn message(user: &str, text: &str) -> Self {
        ChatPayload::Message {
            user: user.to_owned(),
            text: text.to_owned(),
            timestamp: now_millis(),
        }
    }

    pub fn typing(user: &str, is_typing: bool) -> Self {
        ChatPayload::Typing {
            user: user.to_owned(),
            is_typing,
            timestamp: now_millis(),
        }
    }

    pub fn timestamp(&self) -> u64 {
        match self {
            ChatPayload::Message { timestamp, .. } | ChatPayload::Typing { timestamp, .. } => {
                *timestamp
            }
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Classification of inbound data-path bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundPayload {
    Structured(ChatPayload),
    /// Raw or undecodable input, surfaced verbatim as message text.
    Plain(String),
}

impl InboundPayload {
    pub fn classify(data: &[u8]) -> Self {
        let text = String::from_utf8_lossy(data);
        match serde_json::from_str::<ChatPayload>(&text) {
            Ok(payload) => InboundPayload::Structured(payload),
            Err(_) => InboundPayload::Plain(text.into_owned()),
        }
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
