//! Relay wire protocol: JSON frames over a persistent message-oriented
//! socket.
//!
//! Outbound: `connect {userId}`, `join {room, name}`, `leave-room {room,
//! userId}`, `signal {to, …}`. Inbound: `id {id, peers}`, `peer-connected`,
//! `peer-disconnected`, `signal {from, …}`, `room-joined`, `error`.
//!
//! Signal frames exist in two shapes in the wild: the payload nested under a
//! `signal` object, or flattened at the top level. We emit both at once for
//! compatibility, and extract with nested-then-flat precedence so one frame
//! always yields exactly one canonical event.

use crate::model::peer::PeerId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Handshake signal kinds relayed between peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Offer,
    Answer,
    Candidate,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Offer => "offer",
            SignalKind::Answer => "answer",
            SignalKind::Candidate => "candidate",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "offer" => Some(SignalKind::Offer),
            "answer" => Some(SignalKind::Answer),
            "candidate" => Some(SignalKind::Candidate),
            _ => None,
        }
    }
}

/// Roster entry as reported by the relay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RelayPeer {
    pub id: PeerId,
    #[serde(default)]
    pub name: String,
}

/// Frames sent to the relay.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientFrame {
    Connect {
        #[serde(rename = "userId")]
        user_id: String,
    },
    Join {
        room: String,
        name: String,
    },
    LeaveRoom {
        room: String,
        #[serde(rename = "userId")]
        user_id: String,
    },
    Signal(SignalFrame),
}

/// Outbound signal frame. The handshake payload is carried twice: nested
/// under `signal` (with its kind as `type`) and flattened at the top level,
/// so both receiver styles can decode it.
#[derive(Debug, Clone, Serialize)]
pub struct SignalFrame {
    pub to: PeerId,
    pub signal: Value,
    #[serde(flatten)]
    pub compat: Map<String, Value>,
}

impl SignalFrame {
    /// Build a dual-shape frame from a payload object such as
    /// `{"sdp": …}` or `{"candidate": …}`.
    pub fn new(kind: SignalKind, payload: Value, to: PeerId) -> Self {
        let fields = match payload {
            Value::Object(map) => map,
            other => {
                // Scalar payloads are keyed by kind so they stay addressable
                // in both shapes.
                let mut map = Map::new();
                map.insert(kind.as_str().to_owned(), other);
                map
            }
        };

        let mut signal = fields.clone();
        signal.insert("type".to_owned(), Value::String(kind.as_str().to_owned()));

        let mut compat = fields;
        if matches!(kind, SignalKind::Offer | SignalKind::Answer) {
            // The flattened shape cannot reuse `type` (taken by the frame
            // envelope), so session descriptions carry their kind here.
            compat.insert(
                "sdpType".to_owned(),
                Value::String(kind.as_str().to_owned()),
            );
        }

        Self {
            to,
            signal: Value::Object(signal),
            compat,
        }
    }
}

/// Events decoded from relay frames.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    /// The relay assigned our id and listed the members already present.
    Identified {
        local_id: PeerId,
        peers: Vec<RelayPeer>,
    },
    PeerJoined {
        peer_id: PeerId,
        name: String,
    },
    PeerLeft {
        peer_id: PeerId,
        name: String,
    },
    Signal {
        kind: SignalKind,
        payload: Value,
        from: PeerId,
    },
    RoomJoined {
        room: String,
    },
    Error {
        message: String,
    },
    /// The relay socket closed. Synthesized by the reader, not a wire frame.
    Closed,
}

impl RelayEvent {
    /// Decode one relay frame. `Err` means the frame was not JSON at all;
    /// `Ok(None)` means well-formed JSON we do not recognize. Both are
    /// logged and discarded by the caller, neither is fatal.
    pub fn parse(raw: &str) -> Result<Option<RelayEvent>, serde_json::Error> {
        let value: Value = serde_json::from_str(raw)?;
        Ok(Self::from_value(&value))
    }

    pub fn from_value(value: &Value) -> Option<RelayEvent> {
        match value.get("type")?.as_str()? {
            "id" => {
                let local_id = PeerId::from(value.get("id")?.as_str()?);
                let peers = value
                    .get("peers")
                    .cloned()
                    .map(|p| serde_json::from_value(p).unwrap_or_default())
                    .unwrap_or_default();
                Some(RelayEvent::Identified { local_id, peers })
            }
            "peer-connected" => Some(RelayEvent::PeerJoined {
                peer_id: PeerId::from(value.get("id")?.as_str()?),
                name: string_field(value, "name"),
            }),
            "peer-disconnected" => Some(RelayEvent::PeerLeft {
                peer_id: PeerId::from(value.get("id")?.as_str()?),
                name: string_field(value, "name"),
            }),
            "signal" => normalize_signal(value),
            "room-joined" => Some(RelayEvent::RoomJoined {
                room: string_field(value, "room"),
            }),
            "error" => Some(RelayEvent::Error {
                message: string_field(value, "message"),
            }),
            _ => None,
        }
    }
}

fn string_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned()
}

/// Extract the canonical signal from a frame whose payload may be nested
/// under `signal`, flattened at the top level, or duplicated in both places.
/// The nested shape wins when both are present.
fn normalize_signal(value: &Value) -> Option<RelayEvent> {
    let from = PeerId::from(value.get("from")?.as_str()?);

    let extracted = value
        .get("signal")
        .and_then(Value::as_object)
        .and_then(extract_nested)
        .or_else(|| value.as_object().and_then(extract_flat));

    extracted.map(|(kind, payload)| RelayEvent::Signal {
        kind,
        payload,
        from,
    })
}

fn extract_nested(signal: &Map<String, Value>) -> Option<(SignalKind, Value)> {
    let kind = SignalKind::parse(signal.get("type")?.as_str()?)?;
    let mut payload = signal.clone();
    payload.remove("type");
    Some((kind, Value::Object(payload)))
}

/// Flattened fallback: candidate frames carry a `candidate` key; session
/// descriptions carry `sdp` plus `sdpType`. Anything else is undecodable.
fn extract_flat(frame: &Map<String, Value>) -> Option<(SignalKind, Value)> {
    if let Some(candidate) = frame.get("candidate") {
        let mut payload = Map::new();
        payload.insert("candidate".to_owned(), candidate.clone());
        return Some((SignalKind::Candidate, Value::Object(payload)));
    }
    if let Some(sdp) = frame.get("sdp") {
        let kind = SignalKind::parse(frame.get("sdpType")?.as_str()?)?;
        if kind == SignalKind::Candidate {
            return None;
        }
        let mut payload = Map::new();
        payload.insert("sdp".to_owned(), sdp.clone());
        return Some((kind, Value::Object(payload)));
    }
    None
}
