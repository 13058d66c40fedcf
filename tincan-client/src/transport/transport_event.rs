use bytes::Bytes;
use serde_json::Value;
use tincan_core::PeerId;

/// Events the transport layer feeds into the session event loop.
#[derive(Debug)]
pub enum TransportEvent {
    /// The underlying link reached the connected state.
    LinkEstablished(PeerId),

    /// The message data path is open and writable.
    DataPathOpen(PeerId),

    /// Inbound bytes from the peer's data path.
    Message(PeerId, Bytes),

    /// A local ICE candidate to relay to the peer.
    CandidateGenerated(PeerId, Value),

    /// The link was lost or failed.
    LinkLost(PeerId),
}
