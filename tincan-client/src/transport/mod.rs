//! The opaque transport capability: per-peer handshake and data path.
//!
//! The session layer never touches ICE or SDP internals; it drives the
//! handshake through [`PeerLink`] and receives progress through
//! [`TransportEvent`]s funneled into its event loop.

mod transport_config;
mod transport_event;
mod webrtc_link;

pub use transport_config::TransportConfig;
pub use transport_event::TransportEvent;
pub use webrtc_link::WebRtcConnector;

use crate::error::TransportError;
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use tincan_core::{PeerId, PeerRole};
use tokio::sync::mpsc;

/// Factory for per-peer transport links.
#[async_trait]
pub trait PeerConnector: Send + Sync {
    /// Open a fresh link for `peer_id`. Events for the link are delivered
    /// through `events`; an Initiator link also prepares the outbound data
    /// path so the offer carries it.
    async fn open(
        &self,
        peer_id: PeerId,
        role: PeerRole,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Box<dyn PeerLink>, TransportError>;
}

/// Handle to one peer's transport: handshake operations plus the data path.
#[async_trait]
pub trait PeerLink: Send + Sync {
    /// Produce the local offer (Initiator side).
    async fn create_offer(&self) -> Result<String, TransportError>;

    /// Apply a remote offer and produce the answer (Responder side).
    async fn accept_offer(&self, sdp: &str) -> Result<String, TransportError>;

    /// Apply the remote answer to a previously created offer.
    async fn apply_answer(&self, sdp: &str) -> Result<(), TransportError>;

    /// Apply a remote ICE candidate. May arrive before or after
    /// offer/answer completion.
    async fn add_remote_candidate(&self, candidate: Value) -> Result<(), TransportError>;

    /// Send bytes over the data path. Fails with
    /// [`TransportError::NotOpen`] before the path is ready.
    async fn send(&self, data: Bytes) -> Result<(), TransportError>;

    /// Close the link. Best-effort and idempotent.
    async fn close(&self);
}
