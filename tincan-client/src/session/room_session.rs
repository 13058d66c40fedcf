use crate::session::events::{ChatMessage, EventSink, RosterEntry, SessionStatus, TypingUpdate};
use crate::session::peer_session::{PeerConnectionState, PeerSession};
use crate::session::session_command::SessionCommand;
use crate::signaling::RelayOutput;
use crate::transport::{PeerConnector, TransportEvent};
use bytes::Bytes;
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tincan_core::{ChatPayload, InboundPayload, PeerId, PeerRole, RelayEvent, SignalKind};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const TRANSPORT_CHANNEL_CAPACITY: usize = 256;

/// Remote candidates held for a peer whose offer has not arrived yet.
const MAX_BUFFERED_CANDIDATES: usize = 32;

/// Why the session loop returned control to the supervisor.
#[derive(Debug)]
pub(crate) enum SessionExit {
    /// The relay socket closed underneath us. `was_connected` is true once
    /// the relay identified us, and resets the supervisor's backoff counter.
    RelayClosed { was_connected: bool },
    Left,
    Disposed,
}

/// One joined room: owns every peer session and is the only task that
/// touches them. Relay events, transport events and caller commands all
/// funnel into [`RoomSession::run`].
pub(crate) struct RoomSession {
    room: String,
    local_name: String,
    local_id: Option<PeerId>,
    relay: Arc<dyn RelayOutput>,
    relay_rx: mpsc::Receiver<RelayEvent>,
    connector: Arc<dyn PeerConnector>,
    transport_tx: mpsc::Sender<TransportEvent>,
    transport_rx: mpsc::Receiver<TransportEvent>,
    command_rx: mpsc::Receiver<SessionCommand>,
    peers: HashMap<PeerId, PeerSession>,
    /// Names learned from the roster before any handshake with the peer.
    pending_names: HashMap<PeerId, String>,
    /// Candidates that raced ahead of the offer that creates the session.
    pending_candidates: HashMap<PeerId, Vec<Value>>,
    events: EventSink,
    max_dial_attempts: u32,
    was_connected: bool,
}

impl RoomSession {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        room: String,
        local_name: String,
        relay: Arc<dyn RelayOutput>,
        relay_rx: mpsc::Receiver<RelayEvent>,
        connector: Arc<dyn PeerConnector>,
        command_rx: mpsc::Receiver<SessionCommand>,
        events: EventSink,
        max_dial_attempts: u32,
    ) -> Self {
        let (transport_tx, transport_rx) = mpsc::channel(TRANSPORT_CHANNEL_CAPACITY);
        Self {
            room,
            local_name,
            local_id: None,
            relay,
            relay_rx,
            connector,
            transport_tx,
            transport_rx,
            command_rx,
            peers: HashMap::new(),
            pending_names: HashMap::new(),
            pending_candidates: HashMap::new(),
            events,
            max_dial_attempts,
            was_connected: false,
        }
    }

    /// Drive the session until the relay drops or the caller leaves. The
    /// command receiver is handed back so the supervisor keeps listening
    /// across reconnects.
    pub(crate) async fn run(mut self) -> (SessionExit, mpsc::Receiver<SessionCommand>) {
        if let Err(e) = self.relay.join_room(&self.room, &self.local_name).await {
            warn!(room = %self.room, "join failed: {e}");
            self.teardown().await;
            return (
                SessionExit::RelayClosed {
                    was_connected: false,
                },
                self.command_rx,
            );
        }
        self.events.publish_room(&self.room, &self.local_name);

        loop {
            tokio::select! {
                command = self.command_rx.recv() => {
                    let Some(command) = command else {
                        self.teardown().await;
                        return (SessionExit::Disposed, self.command_rx);
                    };
                    match command {
                        SessionCommand::SendMessage { text } => self.send_message(&text).await,
                        SessionCommand::SetTyping { is_typing } => self.set_typing(is_typing).await,
                        SessionCommand::LeaveRoom => {
                            self.relay.leave_room(&self.room).await;
                            self.teardown().await;
                            return (SessionExit::Left, self.command_rx);
                        }
                        SessionCommand::Dispose => {
                            self.relay.leave_room(&self.room).await;
                            self.teardown().await;
                            return (SessionExit::Disposed, self.command_rx);
                        }
                    }
                }
                event = self.relay_rx.recv() => {
                    match event {
                        Some(RelayEvent::Closed) | None => {
                            let was_connected = self.was_connected;
                            self.teardown().await;
                            return (SessionExit::RelayClosed { was_connected }, self.command_rx);
                        }
                        Some(event) => self.handle_relay_event(event).await,
                    }
                }
                event = self.transport_rx.recv() => {
                    // Never `None`: we hold a sender ourselves.
                    if let Some(event) = event {
                        self.handle_transport_event(event).await;
                    }
                }
            }
        }
    }

    async fn handle_relay_event(&mut self, event: RelayEvent) {
        match event {
            RelayEvent::Identified { local_id, peers } => {
                info!(id = %local_id, peers = peers.len(), "identified by relay");
                self.local_id = Some(local_id);
                for peer in peers {
                    self.pending_names.insert(peer.id, peer.name);
                }
                self.was_connected = true;
                self.events.set_status(SessionStatus::Connected);
                self.publish_roster();
            }
            RelayEvent::PeerJoined { peer_id, name } => {
                info!(peer = %peer_id, %name, "peer joined, dialing");
                self.pending_names.insert(peer_id.clone(), name);
                self.dial_peer(peer_id).await;
                self.publish_roster();
            }
            RelayEvent::PeerLeft { peer_id, name } => {
                info!(peer = %peer_id, %name, "peer left");
                if let Some(session) = self.peers.remove(&peer_id) {
                    session.link.close().await;
                }
                self.pending_names.remove(&peer_id);
                self.pending_candidates.remove(&peer_id);
                self.publish_roster();
            }
            RelayEvent::Signal {
                kind,
                payload,
                from,
            } => self.handle_signal(kind, payload, from).await,
            RelayEvent::RoomJoined { room } => {
                debug!(%room, "room join acknowledged");
            }
            RelayEvent::Error { message } => {
                warn!("relay error: {message}");
            }
            // Closed is intercepted by the event loop before dispatch.
            RelayEvent::Closed => {}
        }
    }

    /// Open an Initiator link to a newly joined peer and send the offer. A
    /// peer id reappearing means the old session is stale: the peer rejoined
    /// before we saw it leave, so its state and queue are discarded.
    async fn dial_peer(&mut self, peer_id: PeerId) {
        if let Some(stale) = self.peers.remove(&peer_id) {
            warn!(peer = %peer_id, "replacing stale session for rejoined peer");
            stale.link.close().await;
        }

        let link = match self
            .connector
            .open(peer_id.clone(), PeerRole::Initiator, self.transport_tx.clone())
            .await
        {
            Ok(link) => link,
            Err(e) => {
                warn!(peer = %peer_id, "failed to open link: {e}");
                return;
            }
        };

        let display_name = self.pending_names.get(&peer_id).cloned();
        let mut session = PeerSession::new(peer_id.clone(), display_name, PeerRole::Initiator, link);
        session.state = PeerConnectionState::Connecting;

        let offer = match session.link.create_offer().await {
            Ok(offer) => offer,
            Err(e) => {
                warn!(peer = %peer_id, "offer creation failed: {e}");
                self.drop_failed_session(session).await;
                return;
            }
        };
        if let Err(e) = self
            .relay
            .send_signal(SignalKind::Offer, json!({"sdp": offer}), &peer_id)
            .await
        {
            warn!(peer = %peer_id, "failed to relay offer: {e}");
        }

        self.apply_buffered_candidates(&mut session).await;
        self.peers.insert(peer_id, session);
    }

    /// A handshake that cannot produce its own SDP is unrecoverable.
    /// Failed sessions never stay in the table, so the peer can come back
    /// through a fresh join or inbound offer.
    async fn drop_failed_session(&mut self, mut session: PeerSession) {
        session.state = PeerConnectionState::Failed;
        session.link.close().await;
        self.pending_names.remove(&session.peer_id);
        self.pending_candidates.remove(&session.peer_id);
        self.publish_roster();
    }

    async fn handle_signal(&mut self, kind: SignalKind, payload: Value, from: PeerId) {
        if self.local_id.as_ref() == Some(&from) {
            debug!("ignoring signal echoed back from ourselves");
            return;
        }
        match kind {
            SignalKind::Offer => {
                if self.peers.contains_key(&from) {
                    // Both sides dialing at once; the join observer wins.
                    warn!(peer = %from, "ignoring offer for peer we already dialed");
                    return;
                }
                let Some(sdp) = payload.get("sdp").and_then(Value::as_str) else {
                    warn!(peer = %from, "offer without sdp");
                    return;
                };

                let link = match self
                    .connector
                    .open(from.clone(), PeerRole::Responder, self.transport_tx.clone())
                    .await
                {
                    Ok(link) => link,
                    Err(e) => {
                        warn!(peer = %from, "failed to open link: {e}");
                        return;
                    }
                };

                let display_name = self.pending_names.get(&from).cloned();
                let mut session =
                    PeerSession::new(from.clone(), display_name, PeerRole::Responder, link);
                session.state = PeerConnectionState::Connecting;

                let answer = match session.link.accept_offer(sdp).await {
                    Ok(answer) => answer,
                    Err(e) => {
                        warn!(peer = %from, "failed to accept offer: {e}");
                        self.drop_failed_session(session).await;
                        return;
                    }
                };
                if let Err(e) = self
                    .relay
                    .send_signal(SignalKind::Answer, json!({"sdp": answer}), &from)
                    .await
                {
                    warn!(peer = %from, "failed to relay answer: {e}");
                }

                self.apply_buffered_candidates(&mut session).await;
                self.peers.insert(from, session);
                self.publish_roster();
            }
            SignalKind::Answer => {
                let Some(session) = self.peers.get_mut(&from) else {
                    warn!(peer = %from, "answer for unknown peer");
                    return;
                };
                let Some(sdp) = payload.get("sdp").and_then(Value::as_str) else {
                    warn!(peer = %from, "answer without sdp");
                    return;
                };
                if let Err(e) = session.link.apply_answer(sdp).await {
                    warn!(peer = %from, "failed to apply answer: {e}");
                }
            }
            SignalKind::Candidate => {
                let candidate = payload.get("candidate").cloned().unwrap_or(payload);
                match self.peers.get_mut(&from) {
                    Some(session) => {
                        if let Err(e) = session.link.add_remote_candidate(candidate).await {
                            warn!(peer = %from, "failed to add candidate: {e}");
                        }
                    }
                    None => {
                        // Candidates can race ahead of the offer; keep a
                        // bounded number for the session the offer creates.
                        let buffered = self.pending_candidates.entry(from.clone()).or_default();
                        if buffered.len() < MAX_BUFFERED_CANDIDATES {
                            debug!(peer = %from, "buffering candidate for unknown peer");
                            buffered.push(candidate);
                        } else {
                            warn!(peer = %from, "candidate buffer full, discarding");
                        }
                    }
                }
            }
        }
    }

    async fn apply_buffered_candidates(&mut self, session: &mut PeerSession) {
        let Some(buffered) = self.pending_candidates.remove(&session.peer_id) else {
            return;
        };
        debug!(peer = %session.peer_id, count = buffered.len(), "draining buffered candidates");
        for candidate in buffered {
            if let Err(e) = session.link.add_remote_candidate(candidate).await {
                warn!(peer = %session.peer_id, "buffered candidate rejected: {e}");
            }
        }
    }

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::LinkEstablished(peer_id) => {
                if let Some(session) = self.peers.get_mut(&peer_id) {
                    session.state = PeerConnectionState::Connected;
                    info!(peer = %peer_id, "link established");
                }
            }
            TransportEvent::DataPathOpen(peer_id) => {
                self.flush_outbound(&peer_id).await;
            }
            TransportEvent::Message(peer_id, data) => {
                self.deliver_inbound(&peer_id, &data);
            }
            TransportEvent::CandidateGenerated(peer_id, candidate) => {
                if let Err(e) = self
                    .relay
                    .send_signal(SignalKind::Candidate, json!({"candidate": candidate}), &peer_id)
                    .await
                {
                    warn!(peer = %peer_id, "failed to relay candidate: {e}");
                }
            }
            TransportEvent::LinkLost(peer_id) => {
                self.handle_link_lost(peer_id).await;
            }
        }
    }

    /// Flush the peer's queue in order now that the data path is writable.
    /// Payloads are stamped at flush time, not enqueue time.
    async fn flush_outbound(&mut self, peer_id: &PeerId) {
        let local_name = self.local_name.clone();
        let Some(session) = self.peers.get_mut(peer_id) else {
            return;
        };
        session.data_path_open = true;
        info!(peer = %peer_id, queued = session.outbound.len(), "data path open");

        while let Some(text) = session.outbound.pop_front() {
            let payload = ChatPayload::message(&local_name, &text);
            let encoded = match payload.encode() {
                Ok(encoded) => encoded,
                Err(e) => {
                    warn!(peer = %peer_id, "dropping unencodable message: {e}");
                    continue;
                }
            };
            if let Err(e) = session.link.send(Bytes::from(encoded)).await {
                warn!(peer = %peer_id, "flush interrupted: {e}");
                session.outbound.push_front(text);
                break;
            }
        }
    }

    fn deliver_inbound(&mut self, peer_id: &PeerId, data: &[u8]) {
        let fallback_user = self
            .peers
            .get(peer_id)
            .map(|s| s.name().to_owned())
            .unwrap_or_else(|| peer_id.to_string());

        match InboundPayload::classify(data) {
            InboundPayload::Structured(ChatPayload::Message {
                user,
                text,
                timestamp,
            }) => self.events.emit_message(ChatMessage {
                user,
                text,
                timestamp,
                is_own: false,
            }),
            InboundPayload::Structured(ChatPayload::Typing {
                user, is_typing, ..
            }) => self.events.emit_typing(TypingUpdate { user, is_typing }),
            InboundPayload::Plain(text) => {
                // Raw text from a minimal peer; attribute it by roster name.
                let stamp = ChatPayload::message(&fallback_user, &text);
                self.events.emit_message(ChatMessage {
                    user: fallback_user,
                    text,
                    timestamp: stamp.timestamp(),
                    is_own: false,
                });
            }
        }
    }

    /// An Initiator gets a bounded number of fresh dials; a Responder waits
    /// for the remote side to re-offer instead, so both ends never redial
    /// into each other.
    async fn handle_link_lost(&mut self, peer_id: PeerId) {
        let Some(session) = self.peers.get(&peer_id) else {
            return;
        };
        let redial = session.role == PeerRole::Initiator
            && session.state != PeerConnectionState::Failed
            && session.dial_attempts < self.max_dial_attempts;
        if !redial {
            warn!(peer = %peer_id, "link lost, failing peer");
            if let Some(session) = self.peers.remove(&peer_id) {
                session.link.close().await;
            }
            self.pending_names.remove(&peer_id);
            self.pending_candidates.remove(&peer_id);
            self.publish_roster();
            return;
        }

        let Some(mut session) = self.peers.remove(&peer_id) else {
            return;
        };
        session.link.close().await;
        session.dial_attempts += 1;
        session.state = PeerConnectionState::Disconnected;
        session.data_path_open = false;
        info!(peer = %peer_id, attempt = session.dial_attempts, "redialing peer");

        match self
            .connector
            .open(peer_id.clone(), PeerRole::Initiator, self.transport_tx.clone())
            .await
        {
            Ok(link) => {
                session.link = link;
                session.state = PeerConnectionState::Connecting;
                let offer = match session.link.create_offer().await {
                    Ok(offer) => offer,
                    Err(e) => {
                        warn!(peer = %peer_id, "re-offer failed: {e}");
                        self.drop_failed_session(session).await;
                        return;
                    }
                };
                if let Err(e) = self
                    .relay
                    .send_signal(SignalKind::Offer, json!({"sdp": offer}), &peer_id)
                    .await
                {
                    warn!(peer = %peer_id, "failed to relay re-offer: {e}");
                }
                self.peers.insert(peer_id, session);
            }
            Err(e) => {
                warn!(peer = %peer_id, "redial failed: {e}");
                self.pending_names.remove(&peer_id);
                self.pending_candidates.remove(&peer_id);
                self.publish_roster();
            }
        }
    }

    /// Local echo first, then one delivery attempt per peer. Peers without
    /// an open data path get the text queued for the flush on open.
    async fn send_message(&mut self, text: &str) {
        let payload = ChatPayload::message(&self.local_name, text);
        self.events.emit_message(ChatMessage {
            user: self.local_name.clone(),
            text: text.to_owned(),
            timestamp: payload.timestamp(),
            is_own: true,
        });

        let encoded = match payload.encode() {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!("failed to encode message: {e}");
                return;
            }
        };

        for session in self.peers.values_mut() {
            // A non-empty queue means an interrupted flush; enqueue behind
            // it to keep the per-peer order.
            if session.data_path_open && session.outbound.is_empty() {
                if let Err(e) = session.link.send(Bytes::from(encoded.clone())).await {
                    warn!(peer = %session.peer_id, "send failed, queueing: {e}");
                    session.outbound.push_back(text.to_owned());
                }
            } else {
                session.outbound.push_back(text.to_owned());
            }
        }
    }

    /// Typing is ephemeral: delivered only to peers with an open data path,
    /// never queued.
    async fn set_typing(&mut self, is_typing: bool) {
        let payload = ChatPayload::typing(&self.local_name, is_typing);
        let encoded = match payload.encode() {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!("failed to encode typing update: {e}");
                return;
            }
        };

        for session in self.peers.values_mut() {
            if !session.data_path_open {
                continue;
            }
            if let Err(e) = session.link.send(Bytes::from(encoded.clone())).await {
                debug!(peer = %session.peer_id, "typing update dropped: {e}");
            }
        }
    }

    fn publish_roster(&self) {
        // Sessions override pending entries; BTreeMap keeps the order stable.
        let mut entries: BTreeMap<&PeerId, &str> = self
            .pending_names
            .iter()
            .map(|(id, name)| (id, name.as_str()))
            .collect();
        for (id, session) in &self.peers {
            entries.insert(id, session.name());
        }

        let roster = entries
            .into_iter()
            .map(|(id, name)| RosterEntry {
                id: id.to_string(),
                name: name.to_owned(),
            })
            .collect();
        self.events.publish_roster(roster);
    }

    /// Close every link and reset published state. Queues die with their
    /// sessions; messages queued for a peer that never connected are gone.
    async fn teardown(&mut self) {
        for (_, session) in self.peers.drain() {
            session.link.close().await;
        }
        self.pending_names.clear();
        self.pending_candidates.clear();
        self.events.set_status(SessionStatus::Disconnected);
        self.events.publish_roster(Vec::new());
    }
}
