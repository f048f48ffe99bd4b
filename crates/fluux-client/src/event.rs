// fluux-core/fluux-client
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use chrono::{DateTime, Utc};
use jid::{BareJid, FullJid};

use crate::connection::ConnectionStatus;
use crate::domain::{ConversationId, Message};
use crate::presence::PresenceSnapshot;

/// The typed event stream of the SDK. Every variant carries exactly
/// one payload struct so fields can be added without breaking
/// consumers.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    ConnectionStatusChanged(ConnectionStatusChangedEvent),
    Authenticated(AuthenticatedEvent),
    MessageReceived(MessageReceivedEvent),
    MessageUpdated(MessageUpdatedEvent),
    TypingChanged(TypingChangedEvent),
    ConversationChanged(ConversationChangedEvent),
    RosterUpdated(RosterUpdatedEvent),
    SubscriptionRequested(SubscriptionRequestedEvent),
    ContactPresenceChanged(ContactPresenceChangedEvent),
    UserPresenceChanged(UserPresenceChangedEvent),
    RoomJoined(RoomJoinedEvent),
    RoomLeft(RoomLeftEvent),
    RoomOccupantsChanged(RoomOccupantsChangedEvent),
    RoomSubjectChanged(RoomSubjectChangedEvent),
    RoomInviteReceived(RoomInviteReceivedEvent),
    RoomInviteError(RoomInviteErrorEvent),
    MamSyncCompleted(MamSyncCompletedEvent),
    BookmarksUpdated(BookmarksUpdatedEvent),
    BlocklistUpdated(BlocklistUpdatedEvent),
    ServerInfoUpdated(ServerInfoUpdatedEvent),
    AvatarChanged(AvatarChangedEvent),
    NicknameChanged(NicknameChangedEvent),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionStatusChangedEvent {
    pub status: ConnectionStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatedEvent {
    pub jid: FullJid,
    pub resumed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageReceivedEvent {
    pub conversation: ConversationId,
    pub message: Message,
    /// Archive and carbon-sent messages never trigger notifications.
    pub is_live: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageUpdatedEvent {
    pub conversation: ConversationId,
    pub message_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypingChangedEvent {
    pub conversation: ConversationId,
    /// Nicknames for rooms, a single marker entry for 1:1 chats.
    pub typing: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversationChangedEvent {
    pub conversation: ConversationId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RosterUpdatedEvent {}

#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionRequestedEvent {
    pub from: BareJid,
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContactPresenceChangedEvent {
    pub jid: BareJid,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserPresenceChangedEvent {
    pub snapshot: PresenceSnapshot,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoomJoinedEvent {
    pub room: BareJid,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoomLeftEvent {
    pub room: BareJid,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoomOccupantsChangedEvent {
    pub room: BareJid,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoomSubjectChangedEvent {
    pub room: BareJid,
    pub subject: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoomInviteReceivedEvent {
    pub room: BareJid,
    pub from: Option<BareJid>,
    pub reason: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoomInviteErrorEvent {
    pub room: BareJid,
    pub condition: String,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDirection {
    Forward,
    Backward,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MamSyncCompletedEvent {
    pub conversation: ConversationId,
    pub direction: SyncDirection,
    pub new_messages: usize,
    pub complete: bool,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BookmarksUpdatedEvent {}

#[derive(Debug, Clone, PartialEq)]
pub struct BlocklistUpdatedEvent {}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerInfoUpdatedEvent {}

#[derive(Debug, Clone, PartialEq)]
pub struct AvatarChangedEvent {
    pub jid: BareJid,
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NicknameChangedEvent {
    pub jid: BareJid,
    pub nickname: String,
}
