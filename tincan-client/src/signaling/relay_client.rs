use crate::error::SignalingError;
use crate::signaling::{RelayConnector, RelayOutput};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use tincan_core::{ClientFrame, PeerId, RelayEvent, SignalFrame, SignalKind};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use uuid::Uuid;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// [`RelayConnector`] over a WebSocket to the relay server.
pub struct WsRelayConnector {
    url: String,
}

impl WsRelayConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl RelayConnector for WsRelayConnector {
    async fn connect(
        &self,
    ) -> Result<(Arc<dyn RelayOutput>, mpsc::Receiver<RelayEvent>), SignalingError> {
        let (stream, _) = connect_async(&self.url)
            .await
            .map_err(|e| SignalingError::RelayUnreachable(e.to_string()))?;
        info!(url = %self.url, "connected to relay");

        let (mut writer, mut reader) = stream.split();
        let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<ClientFrame>();
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        // Writer task: serialize frames onto the socket until the client
        // handle is dropped or the socket dies.
        tokio::spawn(async move {
            while let Some(frame) = frame_rx.recv().await {
                let text = match serde_json::to_string(&frame) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("failed to encode relay frame: {e}");
                        continue;
                    }
                };
                if let Err(e) = writer.send(Message::Text(text.into())).await {
                    warn!("relay write failed: {e}");
                    break;
                }
            }
        });

        // Reader task: decode frames into events, then signal closure so
        // the session can hand control back to the supervisor.
        tokio::spawn(async move {
            while let Some(msg) = reader.next().await {
                let text = match msg {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        warn!("relay read failed: {e}");
                        break;
                    }
                };
                match RelayEvent::parse(&text) {
                    Ok(Some(event)) => {
                        if event_tx.send(event).await.is_err() {
                            return;
                        }
                    }
                    Ok(None) => debug!("ignoring unrecognized relay frame"),
                    Err(e) => warn!("discarding malformed relay frame: {e}"),
                }
            }
            let _ = event_tx.send(RelayEvent::Closed).await;
        });

        // Fresh identity per connection; stale sessions on the relay side
        // never collide with the new one.
        let user_id = Uuid::new_v4().to_string();
        frame_tx
            .send(ClientFrame::Connect {
                user_id: user_id.clone(),
            })
            .map_err(|_| SignalingError::NotConnected)?;

        Ok((Arc::new(RelayClient { frame_tx, user_id }), event_rx))
    }
}

struct RelayClient {
    frame_tx: mpsc::UnboundedSender<ClientFrame>,
    user_id: String,
}

impl RelayClient {
    fn send(&self, frame: ClientFrame) -> Result<(), SignalingError> {
        self.frame_tx
            .send(frame)
            .map_err(|_| SignalingError::NotConnected)
    }
}

#[async_trait]
impl RelayOutput for RelayClient {
    async fn join_room(&self, room: &str, name: &str) -> Result<(), SignalingError> {
        self.send(ClientFrame::Join {
            room: room.to_owned(),
            name: name.to_owned(),
        })
    }

    async fn leave_room(&self, room: &str) {
        let _ = self.send(ClientFrame::LeaveRoom {
            room: room.to_owned(),
            user_id: self.user_id.clone(),
        });
    }

    async fn send_signal(
        &self,
        kind: SignalKind,
        payload: Value,
        to: &PeerId,
    ) -> Result<(), SignalingError> {
        self.send(ClientFrame::Signal(SignalFrame::new(
            kind,
            payload,
            to.clone(),
        )))
    }
}
