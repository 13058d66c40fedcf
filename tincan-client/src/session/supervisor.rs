use crate::config::ClientConfig;
use crate::session::events::{ChatMessage, EventSink, SessionStatus};
use crate::session::room_session::{RoomSession, SessionExit};
use crate::session::session_command::SessionCommand;
use crate::signaling::RelayConnector;
use crate::transport::PeerConnector;
use std::sync::Arc;
use tincan_core::ChatPayload;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{info, warn};

/// Owns the relay connection lifecycle: dial, run a session, and on loss
/// retry with linear backoff (`attempt * base`) until the attempt budget is
/// spent. A session that reached the relay resets the counter, so a flaky
/// link gets the full budget every time it recovers.
pub(crate) async fn run_supervisor(
    config: ClientConfig,
    relay_connector: Arc<dyn RelayConnector>,
    peer_connector: Arc<dyn PeerConnector>,
    events: EventSink,
    mut command_rx: mpsc::Receiver<SessionCommand>,
    room: String,
    local_name: String,
) {
    let mut attempt: u32 = 0;

    loop {
        if attempt == 0 {
            events.set_status(SessionStatus::Connecting);
        }

        match relay_connector.connect().await {
            Ok((relay, relay_rx)) => {
                let session = RoomSession::new(
                    room.clone(),
                    local_name.clone(),
                    relay,
                    relay_rx,
                    peer_connector.clone(),
                    command_rx,
                    events.clone(),
                    config.max_dial_attempts,
                );
                let (exit, reclaimed) = session.run().await;
                command_rx = reclaimed;

                match exit {
                    SessionExit::Left | SessionExit::Disposed => {
                        info!("session ended: {exit:?}");
                        return;
                    }
                    SessionExit::RelayClosed { was_connected } => {
                        warn!(was_connected, "relay connection lost");
                        if was_connected {
                            attempt = 0;
                        }
                    }
                }
            }
            Err(e) => warn!(attempt, "relay dial failed: {e}"),
        }

        attempt += 1;
        if attempt > config.max_reconnect_attempts {
            warn!("reconnect budget exhausted");
            events.set_status(SessionStatus::Failed);
            return;
        }
        events.set_status(SessionStatus::Reconnecting {
            attempt,
            max: config.max_reconnect_attempts,
        });

        // Stay responsive while waiting: disposal cancels the retry, and
        // messages still echo locally even though nothing can deliver them.
        let timer = sleep(config.reconnect_base * attempt);
        tokio::pin!(timer);
        loop {
            tokio::select! {
                _ = &mut timer => break,
                command = command_rx.recv() => match command {
                    Some(SessionCommand::Dispose) | Some(SessionCommand::LeaveRoom) | None => {
                        info!("retry cancelled");
                        events.set_status(SessionStatus::Disconnected);
                        return;
                    }
                    Some(SessionCommand::SendMessage { text }) => {
                        let stamp = ChatPayload::message(&local_name, &text);
                        events.emit_message(ChatMessage {
                            user: local_name.clone(),
                            text,
                            timestamp: stamp.timestamp(),
                            is_own: true,
                        });
                    }
                    Some(SessionCommand::SetTyping { .. }) => {}
                },
            }
        }
    }
}
