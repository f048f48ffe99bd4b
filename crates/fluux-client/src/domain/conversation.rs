// fluux-core/fluux-client
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use chrono::{DateTime, Utc};
use jid::BareJid;

use crate::domain::{MamQueryState, Message};

/// Addresses either kind of conversation in store selectors and
/// events.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConversationId {
    Chat(BareJid),
    Room(BareJid),
}

impl ConversationId {
    pub fn jid(&self) -> &BareJid {
        match self {
            ConversationId::Chat(jid) => jid,
            ConversationId::Room(jid) => jid,
        }
    }
}

/// A 1:1 conversation. Created on the first inbound or outbound
/// message, or when explicitly opened.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    pub id: BareJid,
    pub name: Option<String>,
    pub unread_count: u32,
    pub first_new_message_id: Option<String>,
    pub last_read_at: Option<DateTime<Utc>>,
    pub last_seen_message_id: Option<String>,
    /// The other side is currently composing.
    pub is_typing: bool,
    pub messages: Vec<Message>,
    pub mam: MamQueryState,
}

impl Conversation {
    pub fn new(id: BareJid) -> Self {
        Conversation {
            id,
            name: None,
            unread_count: 0,
            first_new_message_id: None,
            last_read_at: None,
            last_seen_message_id: None,
            is_typing: false,
            messages: Vec::new(),
            mam: MamQueryState::default(),
        }
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Cursor for backward MAM pages: the oldest stanza-id currently in
    /// memory, never a persisted value.
    pub fn oldest_stanza_id_in_memory(&self) -> Option<&str> {
        self.messages
            .iter()
            .find_map(|message| message.stanza_id.as_deref())
    }

    /// Cursor for forward catch-up: the newest stanza-id we know.
    pub fn newest_stanza_id_in_memory(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find_map(|message| message.stanza_id.as_deref())
    }
}
