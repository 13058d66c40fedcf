/// Commands from the [`RoomClient`](crate::RoomClient) facade into the
/// session loop.
#[derive(Debug)]
pub(crate) enum SessionCommand {
    SendMessage { text: String },
    SetTyping { is_typing: bool },
    LeaveRoom,
    Dispose,
}
