pub mod model;

pub use model::{
    ChatPayload, ClientFrame, InboundPayload, PeerId, PeerRole, RelayEvent, RelayPeer,
    SignalFrame, SignalKind,
};
