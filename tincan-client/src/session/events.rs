use serde::Serialize;
use std::fmt;
use tokio::sync::{broadcast, watch};

const STREAM_CAPACITY: usize = 64;

/// High-level connection status shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionStatus {
    Initializing,
    Connecting,
    Connected,
    Disconnected,
    Reconnecting { attempt: u32, max: u32 },
    Failed,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initializing => write!(f, "Initializing…"),
            Self::Connecting => write!(f, "Connecting…"),
            Self::Connected => write!(f, "Connected"),
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Reconnecting { attempt, max } => {
                write!(f, "Reconnecting… ({attempt}/{max})")
            }
            Self::Failed => write!(f, "Connection failed"),
        }
    }
}

/// One peer as shown in the roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RosterEntry {
    pub id: String,
    pub name: String,
}

/// A chat message surfaced to subscribers, local echoes included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub user: String,
    pub text: String,
    pub timestamp: u64,
    pub is_own: bool,
}

/// A peer started or stopped typing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypingUpdate {
    pub user: String,
    pub is_typing: bool,
}

/// Point-in-time view of the whole session.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionSnapshot {
    pub room: Option<String>,
    pub local_name: Option<String>,
    pub peers: Vec<RosterEntry>,
    pub status: SessionStatus,
}

/// Receiver bundle handed to subscribers. Minted on demand; late
/// subscribers see current status and roster immediately.
pub struct SessionEvents {
    pub status: watch::Receiver<SessionStatus>,
    pub roster: watch::Receiver<Vec<RosterEntry>>,
    pub snapshot: watch::Receiver<ConnectionSnapshot>,
    pub messages: broadcast::Receiver<ChatMessage>,
    pub typing: broadcast::Receiver<TypingUpdate>,
}

/// Publishing side, shared by the session loop and the supervisor.
#[derive(Clone)]
pub(crate) struct EventSink {
    status: watch::Sender<SessionStatus>,
    roster: watch::Sender<Vec<RosterEntry>>,
    snapshot: watch::Sender<ConnectionSnapshot>,
    messages: broadcast::Sender<ChatMessage>,
    typing: broadcast::Sender<TypingUpdate>,
}

impl EventSink {
    pub(crate) fn new() -> Self {
        let (status, _) = watch::channel(SessionStatus::Initializing);
        let (roster, _) = watch::channel(Vec::new());
        let (snapshot, _) = watch::channel(ConnectionSnapshot {
            room: None,
            local_name: None,
            peers: Vec::new(),
            status: SessionStatus::Initializing,
        });
        let (messages, _) = broadcast::channel(STREAM_CAPACITY);
        let (typing, _) = broadcast::channel(STREAM_CAPACITY);
        Self {
            status,
            roster,
            snapshot,
            messages,
            typing,
        }
    }

    pub(crate) fn set_status(&self, status: SessionStatus) {
        self.status.send_replace(status);
        self.snapshot.send_modify(|s| s.status = status);
    }

    pub(crate) fn publish_room(&self, room: &str, local_name: &str) {
        self.snapshot.send_modify(|s| {
            s.room = Some(room.to_owned());
            s.local_name = Some(local_name.to_owned());
        });
    }

    pub(crate) fn publish_roster(&self, peers: Vec<RosterEntry>) {
        self.snapshot.send_modify(|s| s.peers = peers.clone());
        self.roster.send_replace(peers);
    }

    pub(crate) fn emit_message(&self, message: ChatMessage) {
        // Errors only mean nobody is subscribed right now.
        let _ = self.messages.send(message);
    }

    pub(crate) fn emit_typing(&self, update: TypingUpdate) {
        let _ = self.typing.send(update);
    }

    pub(crate) fn snapshot(&self) -> ConnectionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> SessionEvents {
        SessionEvents {
            status: self.status.subscribe(),
            roster: self.roster.subscribe(),
            snapshot: self.snapshot.subscribe(),
            messages: self.messages.subscribe(),
            typing: self.typing.subscribe(),
        }
    }
}
