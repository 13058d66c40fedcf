use crate::transport::TransportConfig;
use std::time::Duration;

/// Caller-owned configuration for one room client. Supplied once at
/// construction; nothing here is read from process-global state.
#[derive(Clone)]
pub struct ClientConfig {
    /// WebSocket URL of the signaling relay.
    pub relay_url: String,
    /// STUN/TURN configuration handed to the transport capability.
    pub transport: TransportConfig,
    /// Base interval of the linear relay reconnect backoff
    /// (`attempt * base`).
    pub reconnect_base: Duration,
    /// Relay reconnect attempts before giving up with `Connection failed`.
    pub max_reconnect_attempts: u32,
    /// Dial attempts per Initiator peer session before it is failed out.
    pub max_dial_attempts: u32,
}

impl ClientConfig {
    pub fn new(relay_url: impl Into<String>) -> Self {
        Self {
            relay_url: relay_url.into(),
            transport: TransportConfig::default(),
            reconnect_base: Duration::from_secs(2),
            max_reconnect_attempts: 5,
            max_dial_attempts: 3,
        }
    }
}
