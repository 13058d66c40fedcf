use thiserror::Error;

/// Relay-level failures. These are global to the room session: the
/// reconnection supervisor reacts to them. Per-peer failures never surface
/// through this type.
#[derive(Debug, Error)]
pub enum SignalingError {
    #[error("relay unreachable: {0}")]
    RelayUnreachable(String),

    #[error("not connected to relay")]
    NotConnected,
}

/// Per-peer transport failures, isolated to the session they concern.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport setup failed: {0}")]
    Setup(String),

    #[error("negotiation failed: {0}")]
    Negotiation(String),

    #[error("data path not open")]
    NotOpen,

    #[error("webrtc: {0}")]
    WebRtc(#[from] webrtc::Error),
}
