use crate::config::ClientConfig;
use crate::session::events::{ConnectionSnapshot, EventSink, SessionEvents, SessionStatus};
use crate::session::session_command::SessionCommand;
use crate::session::supervisor::run_supervisor;
use crate::signaling::{RelayConnector, WsRelayConnector};
use crate::transport::{PeerConnector, WebRtcConnector};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// Facade over one room membership. Cheap to share; every method takes
/// `&self` and hands work to the background supervisor task.
pub struct RoomClient {
    config: ClientConfig,
    relay_connector: Arc<dyn RelayConnector>,
    peer_connector: Arc<dyn PeerConnector>,
    events: EventSink,
    command_tx: Mutex<Option<mpsc::Sender<SessionCommand>>>,
    task: Mutex<Option<JoinHandle<()>>>,
    disposed: AtomicBool,
}

impl RoomClient {
    pub fn new(config: ClientConfig) -> Self {
        let relay = Arc::new(WsRelayConnector::new(config.relay_url.clone()));
        let transport = Arc::new(WebRtcConnector::new(config.transport.clone()));
        Self::with_parts(config, relay, transport)
    }

    /// Assemble from explicit connectors. This is the seam the tests use to
    /// substitute scripted relay and transport implementations.
    pub fn with_parts(
        config: ClientConfig,
        relay_connector: Arc<dyn RelayConnector>,
        peer_connector: Arc<dyn PeerConnector>,
    ) -> Self {
        Self {
            config,
            relay_connector,
            peer_connector,
            events: EventSink::new(),
            command_tx: Mutex::new(None),
            task: Mutex::new(None),
            disposed: AtomicBool::new(false),
        }
    }

    /// Join `room` as `name`, replacing any session already running. The
    /// call returns once the supervisor is spawned; progress is observable
    /// through [`subscribe`](Self::subscribe).
    pub async fn initialize(&self, name: &str, room: &str) {
        if self.disposed.load(Ordering::SeqCst) {
            warn!("initialize called after dispose");
            return;
        }

        // Tear down the previous session before starting over.
        if let Some(old) = self.command_tx.lock().await.take() {
            let _ = old.send(SessionCommand::Dispose).await;
        }
        if let Some(old_task) = self.task.lock().await.take() {
            let _ = old_task.await;
        }

        self.events.set_status(SessionStatus::Initializing);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        *self.command_tx.lock().await = Some(command_tx);

        let handle = tokio::spawn(run_supervisor(
            self.config.clone(),
            self.relay_connector.clone(),
            self.peer_connector.clone(),
            self.events.clone(),
            command_rx,
            room.to_owned(),
            name.to_owned(),
        ));
        *self.task.lock().await = Some(handle);
    }

    pub async fn send_message(&self, text: &str) {
        self.send_command(SessionCommand::SendMessage {
            text: text.to_owned(),
        })
        .await;
    }

    pub async fn set_typing(&self, is_typing: bool) {
        self.send_command(SessionCommand::SetTyping { is_typing }).await;
    }

    pub async fn leave_room(&self) {
        if let Some(tx) = self.command_tx.lock().await.take() {
            let _ = tx.send(SessionCommand::LeaveRoom).await;
        }
    }

    /// Shut down for good. Idempotent; later calls and commands are no-ops.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(tx) = self.command_tx.lock().await.take() {
            let _ = tx.send(SessionCommand::Dispose).await;
        }
    }

    /// Fresh receiver bundle for status, roster, messages and typing.
    pub fn subscribe(&self) -> SessionEvents {
        self.events.subscribe()
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        self.events.snapshot()
    }

    async fn send_command(&self, command: SessionCommand) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        let guard = self.command_tx.lock().await;
        match guard.as_ref() {
            Some(tx) => {
                if tx.send(command).await.is_err() {
                    debug!("session is gone, command dropped");
                }
            }
            None => debug!("no active session, command dropped"),
        }
    }
}
