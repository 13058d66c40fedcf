//! Signaling layer: a persistent connection to the relay server.
//!
//! [`RelayConnector`] dials the relay and yields a [`RelayOutput`] handle
//! for outbound frames plus a receiver of decoded [`RelayEvent`]s. The
//! session loop owns the receiver; the output handle is cheap to clone
//! behind an `Arc`.

mod relay_client;

pub use relay_client::WsRelayConnector;

use crate::error::SignalingError;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tincan_core::{PeerId, RelayEvent, SignalKind};
use tokio::sync::mpsc;

/// Outbound half of a live relay connection.
#[async_trait]
pub trait RelayOutput: Send + Sync {
    /// Announce presence in `room` under `name`.
    async fn join_room(&self, room: &str, name: &str) -> Result<(), SignalingError>;

    /// Announce departure from `room`. Best-effort; the relay also drops
    /// membership when the socket closes.
    async fn leave_room(&self, room: &str);

    /// Relay a handshake signal to one peer.
    async fn send_signal(
        &self,
        kind: SignalKind,
        payload: Value,
        to: &PeerId,
    ) -> Result<(), SignalingError>;
}

/// Dials the relay. A fresh connection gets a fresh identity.
#[async_trait]
pub trait RelayConnector: Send + Sync {
    async fn connect(
        &self,
    ) -> Result<(Arc<dyn RelayOutput>, mpsc::Receiver<RelayEvent>), SignalingError>;
}
