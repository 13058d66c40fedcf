use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tincan_client::error::SignalingError;
use tincan_client::signaling::{RelayConnector, RelayOutput};
use tincan_core::{PeerId, RelayEvent, RelayPeer, SignalKind};
use tokio::sync::mpsc;

/// Frames the session pushed to the relay, in order.
#[derive(Debug, Clone)]
pub enum SentFrame {
    Join {
        room: String,
        name: String,
    },
    Leave {
        room: String,
    },
    Signal {
        kind: SignalKind,
        payload: Value,
        to: PeerId,
    },
}

/// Test-side handle to one live "connection": inject inbound events and
/// inspect what the session sent.
pub struct MockRelayHandle {
    events: mpsc::Sender<RelayEvent>,
    sent: Arc<Mutex<Vec<SentFrame>>>,
}

impl MockRelayHandle {
    pub async fn emit(&self, event: RelayEvent) {
        self.events.send(event).await.expect("session is gone");
    }

    pub async fn identify(&self, local_id: &str, peers: Vec<RelayPeer>) {
        self.emit(RelayEvent::Identified {
            local_id: PeerId::from(local_id),
            peers,
        })
        .await;
    }

    pub async fn peer_joined(&self, peer_id: &str, name: &str) {
        self.emit(RelayEvent::PeerJoined {
            peer_id: PeerId::from(peer_id),
            name: name.to_owned(),
        })
        .await;
    }

    pub async fn peer_left(&self, peer_id: &str, name: &str) {
        self.emit(RelayEvent::PeerLeft {
            peer_id: PeerId::from(peer_id),
            name: name.to_owned(),
        })
        .await;
    }

    pub async fn signal(&self, kind: SignalKind, payload: Value, from: &str) {
        self.emit(RelayEvent::Signal {
            kind,
            payload,
            from: PeerId::from(from),
        })
        .await;
    }

    pub async fn offer_from(&self, peer_id: &str, sdp: &str) {
        self.signal(SignalKind::Offer, json!({"sdp": sdp}), peer_id)
            .await;
    }

    /// Simulate the socket dropping.
    pub async fn close(&self) {
        self.emit(RelayEvent::Closed).await;
    }

    pub fn sent_frames(&self) -> Vec<SentFrame> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_signals(&self, kind: SignalKind) -> Vec<(Value, PeerId)> {
        self.sent_frames()
            .into_iter()
            .filter_map(|frame| match frame {
                SentFrame::Signal {
                    kind: k,
                    payload,
                    to,
                } if k == kind => Some((payload, to)),
                _ => None,
            })
            .collect()
    }
}

/// Scripted [`RelayConnector`]. Every accepted dial yields a
/// [`MockRelayHandle`] on the receiver returned by [`MockRelayConnector::new`].
pub struct MockRelayConnector {
    handles: mpsc::UnboundedSender<MockRelayHandle>,
    fail_remaining: AtomicU32,
    connects: AtomicU32,
}

impl MockRelayConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<MockRelayHandle>) {
        let (handles, handle_rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                handles,
                fail_remaining: AtomicU32::new(0),
                connects: AtomicU32::new(0),
            }),
            handle_rx,
        )
    }

    /// Make the next `n` dials fail. Pass `u32::MAX` for all of them.
    pub fn fail_next(&self, n: u32) {
        self.fail_remaining.store(n, Ordering::SeqCst);
    }

    pub fn connect_count(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RelayConnector for MockRelayConnector {
    async fn connect(
        &self,
    ) -> Result<(Arc<dyn RelayOutput>, mpsc::Receiver<RelayEvent>), SignalingError> {
        self.connects.fetch_add(1, Ordering::SeqCst);

        let remaining = self.fail_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            if remaining != u32::MAX {
                self.fail_remaining.store(remaining - 1, Ordering::SeqCst);
            }
            return Err(SignalingError::RelayUnreachable("scripted failure".into()));
        }

        let (event_tx, event_rx) = mpsc::channel(64);
        let sent = Arc::new(Mutex::new(Vec::new()));
        let _ = self.handles.send(MockRelayHandle {
            events: event_tx,
            sent: sent.clone(),
        });
        Ok((Arc::new(MockRelayOutput { sent }), event_rx))
    }
}

struct MockRelayOutput {
    sent: Arc<Mutex<Vec<SentFrame>>>,
}

#[async_trait]
impl RelayOutput for MockRelayOutput {
    async fn join_room(&self, room: &str, name: &str) -> Result<(), SignalingError> {
        self.sent.lock().unwrap().push(SentFrame::Join {
            room: room.to_owned(),
            name: name.to_owned(),
        });
        Ok(())
    }

    async fn leave_room(&self, room: &str) {
        self.sent.lock().unwrap().push(SentFrame::Leave {
            room: room.to_owned(),
        });
    }

    async fn send_signal(
        &self,
        kind: SignalKind,
        payload: Value,
        to: &PeerId,
    ) -> Result<(), SignalingError> {
        self.sent.lock().unwrap().push(SentFrame::Signal {
            kind,
            payload,
            to: to.clone(),
        });
        Ok(())
    }
}
