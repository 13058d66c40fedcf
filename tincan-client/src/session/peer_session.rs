use crate::transport::PeerLink;
use std::collections::VecDeque;
use tincan_core::{PeerId, PeerRole};

/// Handshake progress of one peer link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
}

/// Everything the session tracks for one remote peer.
pub(crate) struct PeerSession {
    pub(crate) peer_id: PeerId,
    pub(crate) display_name: Option<String>,
    pub(crate) role: PeerRole,
    pub(crate) state: PeerConnectionState,
    pub(crate) data_path_open: bool,
    /// Messages queued while the data path is not yet open, oldest first.
    pub(crate) outbound: VecDeque<String>,
    pub(crate) link: Box<dyn PeerLink>,
    /// Transport dials for this peer, the initial one included.
    pub(crate) dial_attempts: u32,
}

impl PeerSession {
    pub(crate) fn new(
        peer_id: PeerId,
        display_name: Option<String>,
        role: PeerRole,
        link: Box<dyn PeerLink>,
    ) -> Self {
        Self {
            peer_id,
            display_name,
            role,
            state: PeerConnectionState::New,
            data_path_open: false,
            outbound: VecDeque::new(),
            link,
            dial_attempts: 1,
        }
    }

    /// Display name, falling back to the peer id.
    pub(crate) fn name(&self) -> &str {
        self.display_name
            .as_deref()
            .unwrap_or_else(|| self.peer_id.as_str())
    }
}
