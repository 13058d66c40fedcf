mod chat;
mod peer;
mod relay;

pub use chat::{ChatPayload, InboundPayload};
pub use peer::{PeerId, PeerRole};
pub use relay::{ClientFrame, RelayEvent, RelayPeer, SignalFrame, SignalKind};
