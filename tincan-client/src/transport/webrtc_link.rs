use crate::error::TransportError;
use crate::transport::{PeerConnector, PeerLink, TransportConfig, TransportEvent};
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use std::sync::Arc;
use tincan_core::{PeerId, PeerRole};
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, warn};
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

const DATA_CHANNEL_LABEL: &str = "chat";

/// [`PeerConnector`] backed by the `webrtc` crate.
pub struct WebRtcConnector {
    config: TransportConfig,
}

impl WebRtcConnector {
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl PeerConnector for WebRtcConnector {
    async fn open(
        &self,
        peer_id: PeerId,
        role: PeerRole,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Box<dyn PeerLink>, TransportError> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| TransportError::Setup(e.to_string()))?;
        let registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .map_err(|e| TransportError::Setup(e.to_string()))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: self.config.ice_servers.clone(),
                ..Default::default()
            }],
            ..Default::default()
        };

        let connection = Arc::new(api.new_peer_connection(rtc_config).await?);
        let data_channel: Arc<RwLock<Option<Arc<RTCDataChannel>>>> = Arc::new(RwLock::new(None));

        // Link state changes feed the session loop.
        let state_tx = events.clone();
        let uid = peer_id.clone();
        connection.on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
            let tx = state_tx.clone();
            let uid = uid.clone();
            Box::pin(async move {
                debug!(peer = %uid, state = ?s, "peer connection state changed");
                match s {
                    RTCPeerConnectionState::Connected => {
                        let _ = tx.send(TransportEvent::LinkEstablished(uid)).await;
                    }
                    RTCPeerConnectionState::Failed
                    | RTCPeerConnectionState::Disconnected
                    | RTCPeerConnectionState::Closed => {
                        let _ = tx.send(TransportEvent::LinkLost(uid)).await;
                    }
                    _ => {}
                }
            })
        }));

        // Trickle ICE: local candidates go back out through the relay.
        let ice_tx = events.clone();
        let uid = peer_id.clone();
        connection.on_ice_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
            let tx = ice_tx.clone();
            let uid = uid.clone();
            Box::pin(async move {
                let Some(candidate) = c else { return };
                let Ok(init) = candidate.to_json() else {
                    return;
                };
                let Ok(value) = serde_json::to_value(init) else {
                    return;
                };
                let _ = tx
                    .send(TransportEvent::CandidateGenerated(uid, value))
                    .await;
            })
        }));

        match role {
            PeerRole::Initiator => {
                // Create the channel up front so the offer carries it.
                let dc = connection
                    .create_data_channel(DATA_CHANNEL_LABEL, None)
                    .await?;
                wire_data_channel(&dc, peer_id.clone(), events.clone());
                *data_channel.write().await = Some(dc);
            }
            PeerRole::Responder => {
                let dc_slot = data_channel.clone();
                let dc_tx = events.clone();
                let uid = peer_id.clone();
                connection.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
                    let dc_slot = dc_slot.clone();
                    let tx = dc_tx.clone();
                    let uid = uid.clone();
                    Box::pin(async move {
                        info!(peer = %uid, label = dc.label(), "inbound data channel");
                        wire_data_channel(&dc, uid, tx);
                        *dc_slot.write().await = Some(dc);
                    })
                }));
            }
        }

        Ok(Box::new(WebRtcLink {
            peer_id,
            connection,
            data_channel,
            pending_candidates: RwLock::new(Vec::new()),
        }))
    }
}

fn wire_data_channel(
    dc: &Arc<RTCDataChannel>,
    peer_id: PeerId,
    events: mpsc::Sender<TransportEvent>,
) {
    let open_tx = events.clone();
    let uid = peer_id.clone();
    dc.on_open(Box::new(move || {
        let tx = open_tx.clone();
        let uid = uid.clone();
        Box::pin(async move {
            info!(peer = %uid, "data channel open");
            let _ = tx.send(TransportEvent::DataPathOpen(uid)).await;
        })
    }));

    let msg_tx = events;
    dc.on_message(Box::new(move |msg: DataChannelMessage| {
        let tx = msg_tx.clone();
        let uid = peer_id.clone();
        Box::pin(async move {
            let bytes = Bytes::from(msg.data.to_vec());
            let _ = tx.send(TransportEvent::Message(uid, bytes)).await;
        })
    }));
}

struct WebRtcLink {
    peer_id: PeerId,
    connection: Arc<RTCPeerConnection>,
    data_channel: Arc<RwLock<Option<Arc<RTCDataChannel>>>>,
    /// Remote candidates that arrived before the remote description.
    pending_candidates: RwLock<Vec<RTCIceCandidateInit>>,
}

impl WebRtcLink {
    async fn drain_pending_candidates(&self) -> Result<(), TransportError> {
        let pending: Vec<_> = self.pending_candidates.write().await.drain(..).collect();
        if !pending.is_empty() {
            debug!(peer = %self.peer_id, count = pending.len(), "applying buffered candidates");
        }
        for candidate in pending {
            self.connection.add_ice_candidate(candidate).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl PeerLink for WebRtcLink {
    async fn create_offer(&self) -> Result<String, TransportError> {
        let offer = self.connection.create_offer(None).await?;
        self.connection.set_local_description(offer.clone()).await?;
        Ok(offer.sdp)
    }

    async fn accept_offer(&self, sdp: &str) -> Result<String, TransportError> {
        let offer = RTCSessionDescription::offer(sdp.to_owned())?;
        self.connection.set_remote_description(offer).await?;
        self.drain_pending_candidates().await?;

        let answer = self.connection.create_answer(None).await?;
        self.connection
            .set_local_description(answer.clone())
            .await?;
        Ok(answer.sdp)
    }

    async fn apply_answer(&self, sdp: &str) -> Result<(), TransportError> {
        let answer = RTCSessionDescription::answer(sdp.to_owned())?;
        self.connection.set_remote_description(answer).await?;
        self.drain_pending_candidates().await
    }

    async fn add_remote_candidate(&self, candidate: Value) -> Result<(), TransportError> {
        let init = match candidate {
            // Some peers send the bare candidate line instead of an init
            // object.
            Value::String(line) => RTCIceCandidateInit {
                candidate: line,
                ..Default::default()
            },
            other => serde_json::from_value(other)
                .map_err(|e| TransportError::Negotiation(format!("bad candidate: {e}")))?,
        };

        if self.connection.remote_description().await.is_some() {
            self.connection.add_ice_candidate(init).await?;
        } else {
            debug!(peer = %self.peer_id, "buffering candidate until remote description");
            self.pending_candidates.write().await.push(init);
        }
        Ok(())
    }

    async fn send(&self, data: Bytes) -> Result<(), TransportError> {
        let dc = self.data_channel.read().await;
        let Some(dc) = dc.as_ref() else {
            return Err(TransportError::NotOpen);
        };
        dc.send(&data).await?;
        Ok(())
    }

    async fn close(&self) {
        // The session has let go of this link; closing must not surface as
        // another LinkLost for the peer.
        self.connection
            .on_peer_connection_state_change(Box::new(|_| Box::pin(async {})));
        if let Err(e) = self.connection.close().await {
            warn!(peer = %self.peer_id, "error closing peer connection: {e}");
        }
    }
}
