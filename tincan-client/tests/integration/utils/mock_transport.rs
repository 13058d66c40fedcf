use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tincan_client::error::TransportError;
use tincan_client::transport::{PeerConnector, PeerLink, TransportEvent};
use tincan_core::{PeerId, PeerRole};
use tokio::sync::mpsc;

/// Test-side handle to one opened link: drive transport events into the
/// session and inspect what it sent.
pub struct MockLinkHandle {
    pub peer_id: PeerId,
    pub role: PeerRole,
    events: mpsc::Sender<TransportEvent>,
    sent: Arc<Mutex<Vec<Bytes>>>,
    candidates: Arc<Mutex<Vec<Value>>>,
    close_count: Arc<AtomicU32>,
}

impl MockLinkHandle {
    pub async fn emit(&self, event: TransportEvent) {
        self.events.send(event).await.expect("session is gone");
    }

    /// Walk the link through established + data path open.
    pub async fn open_data_path(&self) {
        self.emit(TransportEvent::LinkEstablished(self.peer_id.clone()))
            .await;
        self.emit(TransportEvent::DataPathOpen(self.peer_id.clone()))
            .await;
    }

    pub async fn deliver(&self, data: &[u8]) {
        self.emit(TransportEvent::Message(
            self.peer_id.clone(),
            Bytes::copy_from_slice(data),
        ))
        .await;
    }

    pub async fn lose(&self) {
        self.emit(TransportEvent::LinkLost(self.peer_id.clone()))
            .await;
    }

    /// Everything the session pushed down the data path, decoded as UTF-8.
    pub fn sent_texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .collect()
    }

    pub fn remote_candidates(&self) -> Vec<Value> {
        self.candidates.lock().unwrap().clone()
    }

    pub fn close_count(&self) -> u32 {
        self.close_count.load(Ordering::SeqCst)
    }
}

/// Scripted [`PeerConnector`]. Every opened link yields a
/// [`MockLinkHandle`] on the receiver returned by [`MockConnector::new`].
pub struct MockConnector {
    links: mpsc::UnboundedSender<MockLinkHandle>,
    opened: AtomicU32,
    open_failures: AtomicU32,
    offer_failures: Arc<AtomicU32>,
}

impl MockConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<MockLinkHandle>) {
        let (links, link_rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                links,
                opened: AtomicU32::new(0),
                open_failures: AtomicU32::new(0),
                offer_failures: Arc::new(AtomicU32::new(0)),
            }),
            link_rx,
        )
    }

    pub fn open_count(&self) -> u32 {
        self.opened.load(Ordering::SeqCst)
    }

    /// Make the next `n` opens fail before a link is produced.
    pub fn fail_next_opens(&self, n: u32) {
        self.open_failures.store(n, Ordering::SeqCst);
    }

    /// Make `create_offer` fail on the next `n` links that attempt it.
    pub fn fail_next_offers(&self, n: u32) {
        self.offer_failures.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl PeerConnector for MockConnector {
    async fn open(
        &self,
        peer_id: PeerId,
        role: PeerRole,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Box<dyn PeerLink>, TransportError> {
        self.opened.fetch_add(1, Ordering::SeqCst);

        let remaining = self.open_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.open_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(TransportError::Setup("scripted open failure".into()));
        }

        let sent = Arc::new(Mutex::new(Vec::new()));
        let candidates = Arc::new(Mutex::new(Vec::new()));
        let close_count = Arc::new(AtomicU32::new(0));
        let _ = self.links.send(MockLinkHandle {
            peer_id: peer_id.clone(),
            role,
            events,
            sent: sent.clone(),
            candidates: candidates.clone(),
            close_count: close_count.clone(),
        });
        Ok(Box::new(MockLink {
            peer_id,
            sent,
            candidates,
            close_count,
            offer_failures: self.offer_failures.clone(),
        }))
    }
}

struct MockLink {
    peer_id: PeerId,
    sent: Arc<Mutex<Vec<Bytes>>>,
    candidates: Arc<Mutex<Vec<Value>>>,
    close_count: Arc<AtomicU32>,
    offer_failures: Arc<AtomicU32>,
}

#[async_trait]
impl PeerLink for MockLink {
    async fn create_offer(&self) -> Result<String, TransportError> {
        let remaining = self.offer_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.offer_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(TransportError::Negotiation("scripted offer failure".into()));
        }
        Ok(format!("offer-for-{}", self.peer_id))
    }

    async fn accept_offer(&self, sdp: &str) -> Result<String, TransportError> {
        Ok(format!("answer-to-{sdp}"))
    }

    async fn apply_answer(&self, _sdp: &str) -> Result<(), TransportError> {
        Ok(())
    }

    async fn add_remote_candidate(&self, candidate: Value) -> Result<(), TransportError> {
        self.candidates.lock().unwrap().push(candidate);
        Ok(())
    }

    async fn send(&self, data: Bytes) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push(data);
        Ok(())
    }

    async fn close(&self) {
        self.close_count.fetch_add(1, Ordering::SeqCst);
    }
}
