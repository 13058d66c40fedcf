//! Peer session orchestration for relay-bootstrapped P2P text chat.
//!
//! A [`RoomClient`] connects to a signaling relay, joins a room, drives one
//! handshake per remote participant and exchanges messages over the direct
//! data paths once they open. The caller observes everything through the
//! subscriber streams in [`session::events`] and mutates only through the
//! client's command methods.

pub mod client;
pub mod config;
pub mod error;
pub mod session;
pub mod signaling;
pub mod transport;

pub use client::RoomClient;
pub use config::ClientConfig;
pub use error::{SignalingError, TransportError};
pub use session::events::{
    ChatMessage, ConnectionSnapshot, RosterEntry, SessionEvents, SessionStatus, TypingUpdate,
};
pub use session::peer_session::PeerConnectionState;
pub use signaling::{RelayConnector, RelayOutput};
pub use transport::{PeerConnector, PeerLink, TransportConfig, TransportEvent};
