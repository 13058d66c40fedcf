use serde::{Deserialize, Serialize};
use std::fmt;

/// Relay-assigned participant identifier. Opaque, unique within a room and
/// stable for the lifetime of one session.
#[derive(Debug, Serialize, Deserialize, Clone, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct PeerId(pub String);

impl PeerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for PeerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which side of a peer pair drives the handshake. The Initiator opens the
/// data path and sends the first offer; the Responder waits for it. The side
/// that observed the other's join becomes Initiator, so both ends agree
/// without coordination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerRole {
    Initiator,
    Responder,
}
