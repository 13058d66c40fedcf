//! Session orchestration: per-peer handshakes, outbound queues and the
//! reconnect supervisor, all driven by one event loop per joined room.

pub mod events;
pub mod peer_session;

pub(crate) mod room_session;
pub(crate) mod session_command;
pub(crate) mod supervisor;
